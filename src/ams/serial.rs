//! # AMS/HAN Serial Byte Stream
//!
//! This module opens the M-Bus serial adapter and turns it into a lazy,
//! non-restartable stream of bytes. A reader task owns the port, reads small
//! bursts and forwards them byte by byte over a bounded channel.
//!
//! The stream never stops silently: once the reader is done (end of stream,
//! read error or read timeout) the channel closes and
//! [`ByteSource::next_byte`] returns [`AmsError::ChannelClosed`]. There is no
//! transport-level retry; operators restart the process.

use crate::constants::{BYTE_CHANNEL_CAPACITY, DEFAULT_READ_TIMEOUT_SECS};
use crate::error::AmsError;
use log::{debug, error, info};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;

/// Size of a single read from the transport
const READ_BURST: usize = 8;

/// Serial line parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl FromStr for Parity {
    type Err = AmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "n" | "none" => Ok(Parity::None),
            "e" | "even" => Ok(Parity::Even),
            "o" | "odd" => Ok(Parity::Odd),
            other => Err(AmsError::Config(format!(
                "unknown parity '{}' (expected N, E or O)",
                other
            ))),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Parity::None => "N",
            Parity::Even => "E",
            Parity::Odd => "O",
        };
        f.write_str(s)
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        }
    }
}

/// Configuration for serial connection. Immutable once the port is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub address: String,
    pub baudrate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            address: "/dev/ttyUSB0".to_string(),
            baudrate: 2400,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::Even,
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        }
    }
}

impl SerialConfig {
    fn data_bits(&self) -> Result<tokio_serial::DataBits, AmsError> {
        match self.data_bits {
            5 => Ok(tokio_serial::DataBits::Five),
            6 => Ok(tokio_serial::DataBits::Six),
            7 => Ok(tokio_serial::DataBits::Seven),
            8 => Ok(tokio_serial::DataBits::Eight),
            other => Err(AmsError::Transport(format!("unsupported data bits: {}", other))),
        }
    }

    fn stop_bits(&self) -> Result<tokio_serial::StopBits, AmsError> {
        match self.stop_bits {
            1 => Ok(tokio_serial::StopBits::One),
            2 => Ok(tokio_serial::StopBits::Two),
            other => Err(AmsError::Transport(format!("unsupported stop bits: {}", other))),
        }
    }

    /// Opens the serial device and starts streaming its bytes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(&self) -> Result<ByteSource, AmsError> {
        debug!("connecting {:?}", self);
        let port = tokio_serial::new(&self.address, self.baudrate)
            .data_bits(self.data_bits()?)
            .stop_bits(self.stop_bits()?)
            .parity(self.parity.into())
            .timeout(self.read_timeout)
            .open_native_async()
            .map_err(|e| AmsError::Transport(format!("{}: {}", self.address, e)))?;
        info!(
            "Opened {} at {} baud {}{}{}",
            self.address, self.baudrate, self.data_bits, self.parity, self.stop_bits
        );

        Ok(ByteSource::spawn(port, self.read_timeout))
    }
}

/// Sequential byte stream fed by a transport reader task.
pub struct ByteSource {
    rx: mpsc::Receiver<u8>,
}

impl ByteSource {
    /// Starts a reader task that owns `port` and streams its bytes.
    ///
    /// The port is dropped, and thereby closed, exactly once when the reader
    /// ends: on end of stream, on a read error, when no data arrives within
    /// `read_timeout`, or when the `ByteSource` itself is dropped.
    pub fn spawn<R>(port: R, read_timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(BYTE_CHANNEL_CAPACITY);
        tokio::spawn(read_loop(port, tx, read_timeout));
        ByteSource { rx }
    }

    /// Wraps an existing byte channel. The stream ends when every sender is dropped.
    pub fn from_receiver(rx: mpsc::Receiver<u8>) -> Self {
        ByteSource { rx }
    }

    /// Waits for the next byte. Returns [`AmsError::ChannelClosed`] once the
    /// transport has ended and every buffered byte was consumed.
    pub async fn next_byte(&mut self) -> Result<u8, AmsError> {
        self.rx.recv().await.ok_or(AmsError::ChannelClosed)
    }
}

async fn read_loop<R>(mut port: R, tx: mpsc::Sender<u8>, read_timeout: Duration)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_BURST];
    'read: loop {
        let n = match timeout(read_timeout, port.read(&mut buf)).await {
            Ok(Ok(0)) => {
                error!("Reached end of stream");
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                error!("Serial read failed: {}", e);
                break;
            }
            Err(_) => {
                error!("No data from serial port within {:?}", read_timeout);
                break;
            }
        };

        for &byte in &buf[..n] {
            if tx.send(byte).await.is_err() {
                debug!("Byte consumer went away");
                break 'read;
            }
        }
    }

    drop(port);
    info!("Closed connection!");
}
