//! # HDLC Frame Extraction
//!
//! AMS/HAN meters push DLMS telegrams wrapped in HDLC frames of format type 3:
//!
//! ```text
//! 7E | A0 LL | dest | src | ctrl | HCS HCS | information ... | FCS FCS | 7E
//! ```
//!
//! The 11-bit length field counts every byte between the two flags. A closing
//! flag may double as the opening flag of the next frame.
//!
//! [`FrameReader`] pulls bytes from a [`ByteSource`] until one complete frame
//! (flags included) has been assembled. Framing errors are recoverable: the
//! reader keeps what it has read and resynchronises on the next flag in it.
//! Running out of bytes is not, and surfaces as [`AmsError::ChannelClosed`].

use crate::ams::serial::ByteSource;
use crate::constants::{
    HDLC_FLAG, HDLC_FORMAT_TYPE_3, HDLC_FORMAT_TYPE_MASK, HDLC_LENGTH_HIGH_MASK,
    HDLC_MIN_FRAME_LENGTH,
};
use crate::error::AmsError;
use crc::{Crc, CRC_16_IBM_SDLC};
use std::collections::VecDeque;

/// CRC-16/X-25, used for both the header and the frame check sequence.
const X25: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Computes the HDLC check sequence over `data`.
pub fn checksum(data: &[u8]) -> u16 {
    X25.checksum(data)
}

/// Returns the frame length encoded in the two frame format bytes.
pub fn frame_length(format_hi: u8, format_lo: u8) -> usize {
    (((format_hi & HDLC_LENGTH_HIGH_MASK) as usize) << 8) | format_lo as usize
}

/// Assembles raw HDLC frames from a byte stream.
#[derive(Debug, Default)]
pub struct FrameReader {
    /// The last byte consumed was a closing flag.
    at_flag: bool,
    /// Bytes of a frame rejected during framing, scanned again before any new
    /// byte is taken from the source.
    pending: VecDeque<u8>,
    /// The last frame rejected during framing, opening flag included.
    rejected: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the next complete frame, including the opening and closing flags.
    ///
    /// When framing fails, everything read after the opening flag is kept and
    /// searched for the next flag, so a frame that lost bytes in transit
    /// cannot swallow the frame behind it.
    pub async fn next_frame(&mut self, source: &mut ByteSource) -> Result<Vec<u8>, AmsError> {
        if !self.at_flag {
            while self.next_byte(source).await? != HDLC_FLAG {}
        }
        self.at_flag = false;

        let mut frame = vec![HDLC_FLAG];
        match self.read_frame(source, &mut frame).await {
            Ok(()) => {
                self.at_flag = true;
                Ok(frame)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                for &byte in frame[1..].iter().rev() {
                    self.pending.push_front(byte);
                }
                self.rejected = frame;
                Err(e)
            }
        }
    }

    /// Takes the bytes of the last frame rejected during framing.
    pub fn take_rejected(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.rejected)
    }

    async fn next_byte(&mut self, source: &mut ByteSource) -> Result<u8, AmsError> {
        match self.pending.pop_front() {
            Some(byte) => Ok(byte),
            None => source.next_byte().await,
        }
    }

    /// Reads the rest of a frame after its opening flag into `frame`.
    async fn read_frame(
        &mut self,
        source: &mut ByteSource,
        frame: &mut Vec<u8>,
    ) -> Result<(), AmsError> {
        let mut format_hi = self.next_byte(source).await?;
        while format_hi == HDLC_FLAG {
            format_hi = self.next_byte(source).await?;
        }
        frame.push(format_hi);

        if format_hi & HDLC_FORMAT_TYPE_MASK != HDLC_FORMAT_TYPE_3 {
            return Err(AmsError::FrameParse(format!(
                "unexpected frame format byte 0x{:02x}",
                format_hi
            )));
        }

        let format_lo = self.next_byte(source).await?;
        frame.push(format_lo);
        let length = frame_length(format_hi, format_lo);
        if length < HDLC_MIN_FRAME_LENGTH {
            return Err(AmsError::FrameParse(format!(
                "frame length {} is shorter than the minimal header",
                length
            )));
        }

        frame.reserve(length);
        for _ in 2..length {
            let byte = self.next_byte(source).await?;
            frame.push(byte);
        }

        let end = self.next_byte(source).await?;
        frame.push(end);
        if end != HDLC_FLAG {
            return Err(AmsError::FrameParse(format!(
                "expected closing flag after {} bytes, got 0x{:02x}",
                length, end
            )));
        }

        Ok(())
    }
}
