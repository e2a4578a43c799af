//! # Frame Decoder
//!
//! Couples the byte stream to the AMS/HAN decoder: every call to
//! [`FrameDecoder::next`] assembles one HDLC frame, verifies it and decodes the
//! list it carries.
//!
//! Errors come in two classes, told apart by [`AmsError::is_fatal`]:
//! - malformed frames, checksum mismatches and unknown lists are recoverable;
//!   the caller logs them and asks for the next frame.
//! - [`AmsError::ChannelClosed`] means the byte source is exhausted and no
//!   frame will ever arrive again.

use crate::ams::frame::parse_frame;
use crate::ams::hdlc::FrameReader;
use crate::ams::message::{parse_message, AmsMessage};
use crate::ams::serial::ByteSource;
use crate::error::AmsError;
use crate::util::hex::{format_hex_compact, hex_listing};
use log::trace;

pub struct FrameDecoder {
    source: ByteSource,
    reader: FrameReader,
    verbose: bool,
}

impl FrameDecoder {
    pub fn new(source: ByteSource, verbose: bool) -> Self {
        FrameDecoder {
            source,
            reader: FrameReader::new(),
            verbose,
        }
    }

    /// Reads and decodes the next frame.
    pub async fn next(&mut self) -> Result<AmsMessage, AmsError> {
        let raw = match self.reader.next_frame(&mut self.source).await {
            Ok(raw) => raw,
            Err(e) => {
                let rejected = self.reader.take_rejected();
                if !rejected.is_empty() {
                    self.dump(&rejected);
                }
                return Err(e);
            }
        };
        self.dump(&raw);

        let frame = parse_frame(&raw)?;
        parse_message(&frame.information)
    }

    fn dump(&self, raw: &[u8]) {
        if self.verbose {
            println!("\nBuffer({}): \n[{}]", raw.len(), hex_listing(raw));
        }
        trace!("frame: {}", format_hex_compact(raw));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ams::frame::pack_frame;
    use crate::ams::message::{pack_message, ActivePower};
    use tokio::sync::mpsc;

    fn decoder_from(bytes: Vec<u8>) -> FrameDecoder {
        let (tx, rx) = mpsc::channel(bytes.len().max(1));
        for b in bytes {
            tx.try_send(b).unwrap();
        }
        FrameDecoder::new(ByteSource::from_receiver(rx), false)
    }

    fn power(watts: u32) -> AmsMessage {
        AmsMessage::ActivePower(ActivePower {
            date_time: None,
            act_pow_pos: watts,
        })
    }

    fn framed(message: &AmsMessage) -> Vec<u8> {
        pack_frame(&pack_message(message))
    }

    #[tokio::test]
    async fn test_decodes_consecutive_frames() {
        let mut bytes = framed(&power(100));
        bytes.extend(framed(&power(200)));
        let mut decoder = decoder_from(bytes);

        assert_eq!(decoder.next().await.unwrap(), power(100));
        assert_eq!(decoder.next().await.unwrap(), power(200));
        assert!(matches!(decoder.next().await, Err(AmsError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_bad_frame_is_recoverable() {
        let mut corrupt = framed(&power(100));
        let fcs = corrupt.len() - 3;
        corrupt[fcs] ^= 0xAA;
        let mut bytes = corrupt;
        bytes.extend(framed(&power(300)));
        let mut decoder = decoder_from(bytes);

        let err = decoder.next().await.unwrap_err();
        assert!(matches!(err, AmsError::InvalidChecksum { .. }));
        assert!(!err.is_fatal());
        assert_eq!(decoder.next().await.unwrap(), power(300));
    }

    #[tokio::test]
    async fn test_unknown_list_is_recoverable() {
        let apdu = [0x0F, 0x40, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00];
        let mut bytes = pack_frame(&apdu);
        bytes.extend(framed(&power(5)));
        let mut decoder = decoder_from(bytes);

        assert!(matches!(decoder.next().await, Err(AmsError::UnknownMessage(0))));
        assert_eq!(decoder.next().await.unwrap(), power(5));
    }

    #[tokio::test]
    async fn test_frame_with_lost_bytes_is_skipped() {
        let mut gap = framed(&power(100));
        gap.drain(12..16);
        let mut bytes = gap;
        bytes.extend(framed(&power(200)));
        bytes.extend(framed(&power(300)));

        let (tx, rx) = mpsc::channel(bytes.len());
        for b in bytes {
            tx.try_send(b).unwrap();
        }
        drop(tx);
        let mut decoder = FrameDecoder::new(ByteSource::from_receiver(rx), true);

        let mut decoded = Vec::new();
        let mut rejected = 0;
        loop {
            match decoder.next().await {
                Ok(message) => decoded.push(message),
                Err(e) if e.is_fatal() => break,
                Err(_) => rejected += 1,
            }
        }
        assert_eq!(decoded, vec![power(200), power(300)]);
        assert!(rejected >= 1);
    }

    #[tokio::test]
    async fn test_empty_source_is_fatal() {
        let mut decoder = decoder_from(Vec::new());
        let err = decoder.next().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
