//! # Utility Modules
//!
//! Common helpers shared by the decoder and the verbose diagnostics.

pub mod hex;

pub use hex::{decode_hex, format_hex_compact, hex_listing, hex_to_bytes};
