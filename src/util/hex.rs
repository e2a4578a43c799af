//! # Hex Encoding/Decoding Utilities
//!
//! Helpers for rendering raw HDLC frames in verbose output and logs, and for
//! building test frames from hex strings.
//!
//! ## Usage
//!
//! ```rust
//! use ams_han_mqtt::util::hex::{decode_hex, format_hex_compact, hex_listing};
//!
//! let data = decode_hex("7e a0 27 01").unwrap();
//! assert_eq!(hex_listing(&data), "0x7e,0xa0,0x27,0x01");
//! assert_eq!(format_hex_compact(&data), "7e a0 27 01");
//! ```

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

/// Decode hex string to bytes
///
/// Accepts both uppercase and lowercase hex characters.
/// Whitespace is automatically stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }

    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Render a frame as a comma separated list of `0x..` bytes.
///
/// This is the listing printed for every raw frame in verbose mode.
pub fn hex_listing(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("0x{:02x}", b))
        .collect::<Vec<_>>()
        .join(",")
}

/// Format hex data for compact display (useful for logs)
///
/// Formats data as "7e a0 27 01" with spaces between bytes.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Helper for creating test data from hex strings
///
/// Panics on invalid hex (intended for test code only).
pub fn hex_to_bytes(hex: &str) -> Vec<u8> {
    decode_hex(hex).expect("Invalid hex in test data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_listing() {
        assert_eq!(hex_listing(&[0x7E, 0xA0, 0x0F]), "0x7e,0xa0,0x0f");
        assert_eq!(hex_listing(&[]), "");
    }

    #[test]
    fn test_decode_with_whitespace() {
        let expected = vec![0x7E, 0xA0, 0x27, 0x01];
        assert_eq!(decode_hex("7E A0\n27 01").unwrap(), expected);
    }

    #[test]
    fn test_format_compact() {
        assert_eq!(format_hex_compact(&[0xE6, 0xE7, 0x00]), "e6 e7 00");
    }

    #[test]
    fn test_errors() {
        assert_eq!(decode_hex(""), Err(HexError::EmptyString));
        assert_eq!(decode_hex("  "), Err(HexError::EmptyString));
        assert_eq!(decode_hex("7"), Err(HexError::OddLength(1)));
        assert!(matches!(decode_hex("GG"), Err(HexError::DecodeError(_))));
    }
}
