//! # AMS/HAN Bridge Error Handling
//!
//! This module defines the AmsError enum, which represents the different error
//! types that can occur while moving meter telemetry from the serial port to the
//! broker.
//!
//! Errors fall into two classes. Fatal errors ([`AmsError::is_fatal`]) mean the
//! byte source is gone and the process should stop. Everything else is
//! absorbed with a log line and the pipeline carries on.

use thiserror::Error;

/// Represents the different error types that can occur in the bridge.
#[derive(Debug, Error)]
pub enum AmsError {
    /// The serial device could not be opened or failed irrecoverably.
    #[error("Serial transport error: {0}")]
    Transport(String),

    /// The byte stream from the transport has ended; no more frames will arrive.
    #[error("Byte channel is closed")]
    ChannelClosed,

    /// A frame was malformed (bad flags, length, header or element layout).
    #[error("Error parsing AMS frame: {0}")]
    FrameParse(String),

    /// Header or frame check sequence did not match.
    #[error("Invalid checksum: expected 0x{expected:04X}, calculated 0x{calculated:04X}")]
    InvalidChecksum { expected: u16, calculated: u16 },

    /// The data notification carried a list with an unsupported element count.
    #[error("Unknown message type with {0} elements")]
    UnknownMessage(usize),

    /// A sensor update could not be encoded.
    #[error("Couldn't serialize command: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The publish worker has stopped and no longer accepts payloads.
    #[error("Outbound queue is closed")]
    QueueClosed,

    /// The broker client rejected a request or the connection failed.
    #[error("MQTT error: {0}")]
    Broker(String),

    /// Invalid startup configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AmsError {
    /// Returns `true` when the error must stop the pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AmsError::Transport(_) | AmsError::ChannelClosed)
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for AmsError {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => AmsError::FrameParse("truncated frame".into()),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                AmsError::FrameParse(format!("{:?} at {} remaining bytes", e.code, e.input.len()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AmsError::ChannelClosed.is_fatal());
        assert!(AmsError::Transport("gone".into()).is_fatal());
        assert!(!AmsError::FrameParse("bad".into()).is_fatal());
        assert!(!AmsError::InvalidChecksum { expected: 1, calculated: 2 }.is_fatal());
        assert!(!AmsError::UnknownMessage(7).is_fatal());
        assert!(!AmsError::QueueClosed.is_fatal());
    }

    #[test]
    fn test_checksum_display() {
        let err = AmsError::InvalidChecksum {
            expected: 0x906E,
            calculated: 0x1234,
        };
        assert_eq!(
            err.to_string(),
            "Invalid checksum: expected 0x906E, calculated 0x1234"
        );
    }

    #[test]
    fn test_nom_error_maps_to_frame_parse() {
        let input: &[u8] = &[0x01];
        let err: AmsError =
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)).into();
        assert!(matches!(err, AmsError::FrameParse(_)));
    }
}
