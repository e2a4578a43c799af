//! Mock serial port implementation for testing
//!
//! This module provides a scripted, read-only serial port so the byte stream,
//! the frame decoder and the whole pipeline can be exercised without a meter.
//! Once the script is exhausted the port reports end of stream.

use crate::ams::frame::pack_frame;
use crate::ams::message::{pack_message, AmsMessage};
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// One scripted step of the mock port.
#[derive(Debug)]
pub enum MockRead {
    /// Bytes handed out, possibly over several reads.
    Data(Vec<u8>),
    /// A read that fails with the given kind.
    Error(io::ErrorKind),
    /// A read that never completes (a silent meter).
    Stall,
}

/// Mock serial port that replays a script of reads
#[derive(Debug, Default)]
pub struct MockSerialPort {
    script: VecDeque<MockRead>,
    closed: Arc<AtomicUsize>,
}

impl MockSerialPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw bytes to be read from the port
    pub fn queue_rx_data(&mut self, data: &[u8]) -> &mut Self {
        self.script.push_back(MockRead::Data(data.to_vec()));
        self
    }

    /// Queue a meter message wrapped in a valid HDLC frame
    pub fn queue_message(&mut self, message: &AmsMessage) -> &mut Self {
        self.queue_rx_data(&pack_frame(&pack_message(message)))
    }

    /// Queue a read error
    pub fn queue_error(&mut self, kind: io::ErrorKind) -> &mut Self {
        self.script.push_back(MockRead::Error(kind));
        self
    }

    /// Queue a read that never returns
    pub fn queue_stall(&mut self) -> &mut Self {
        self.script.push_back(MockRead::Stall);
        self
    }

    /// Counter incremented when the port is dropped (closed)
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closed)
    }
}

impl Drop for MockSerialPort {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl AsyncRead for MockSerialPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.script.pop_front() {
            None => Poll::Ready(Ok(())),
            Some(MockRead::Data(mut data)) => {
                let n = data.len().min(buf.remaining());
                buf.put_slice(&data[..n]);
                if n < data.len() {
                    self.script.push_front(MockRead::Data(data.split_off(n)));
                }
                Poll::Ready(Ok(()))
            }
            Some(MockRead::Error(kind)) => {
                Poll::Ready(Err(io::Error::new(kind, "mock serial read error")))
            }
            Some(MockRead::Stall) => {
                self.script.push_front(MockRead::Stall);
                Poll::Pending
            }
        }
    }
}
