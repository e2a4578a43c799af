//! # HDLC Frame Parsing
//!
//! Splits a raw frame (as produced by [`FrameReader`](crate::ams::hdlc::FrameReader))
//! into its header fields and information field, and verifies both check
//! sequences. It leverages the `nom` crate for the header layout.
//!
//! ## Usage
//!
//! ```rust
//! use ams_han_mqtt::ams::frame::{pack_frame, parse_frame};
//!
//! let raw = pack_frame(&[0x0F, 0x00, 0x00, 0x00, 0x01]);
//! let frame = parse_frame(&raw).unwrap();
//! assert_eq!(frame.information, vec![0x0F, 0x00, 0x00, 0x00, 0x01]);
//! ```

use crate::ams::hdlc::{checksum, frame_length};
use crate::constants::{
    HDLC_FLAG, HDLC_FORMAT_TYPE_3, HDLC_FORMAT_TYPE_MASK, HDLC_MAX_ADDRESS_LENGTH,
    HDLC_SEGMENTATION_BIT, LLC_HEADER,
};
use crate::error::AmsError;
use nom::{
    bytes::complete::{tag, take_till},
    error::{Error, ErrorKind},
    number::complete::{be_u16, be_u8, le_u16},
    IResult,
};

/// Destination address used when packing frames (client, broadcast)
const PACK_DESTINATION: [u8; 1] = [0x41];

/// Source address used when packing frames (server, logical device 1)
const PACK_SOURCE: [u8; 2] = [0x08, 0x83];

/// Control field used when packing frames (UI frame)
const PACK_CONTROL: u8 = 0x13;

/// A verified HDLC frame with the LLC header stripped from its information field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdlcFrame {
    pub segmented: bool,
    pub destination: Vec<u8>,
    pub source: Vec<u8>,
    pub control: u8,
    /// The APDU following the LLC header.
    pub information: Vec<u8>,
}

/// Parses an HDLC address: 1 to 4 bytes, the last one has its low bit set.
fn address(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (rest, head) = take_till(|b| b & 0x01 == 0x01)(input)?;
    let (rest, last) = be_u8(rest)?;
    if head.len() + 1 > HDLC_MAX_ADDRESS_LENGTH {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::TooLarge)));
    }
    let mut addr = head.to_vec();
    addr.push(last);
    Ok((rest, addr))
}

/// Parses the header up to and including the control byte.
fn header(input: &[u8]) -> IResult<&[u8], (u16, Vec<u8>, Vec<u8>, u8)> {
    let (input, _) = tag(&[HDLC_FLAG][..])(input)?;
    let (input, format) = be_u16(input)?;
    let (input, destination) = address(input)?;
    let (input, source) = address(input)?;
    let (input, control) = be_u8(input)?;
    Ok((input, (format, destination, source, control)))
}

/// Parses and verifies a raw HDLC frame, flags included.
pub fn parse_frame(raw: &[u8]) -> Result<HdlcFrame, AmsError> {
    let (after_header, (format, destination, source, control)) = header(raw)?;

    let [format_hi, format_lo] = format.to_be_bytes();
    if format_hi & HDLC_FORMAT_TYPE_MASK != HDLC_FORMAT_TYPE_3 {
        return Err(AmsError::FrameParse(format!(
            "unsupported frame format 0x{:04x}",
            format
        )));
    }

    let length = frame_length(format_hi, format_lo);
    if raw.len() != length + 2 || raw[raw.len() - 1] != HDLC_FLAG {
        return Err(AmsError::FrameParse(format!(
            "frame is {} bytes but header announces {}",
            raw.len(),
            length + 2
        )));
    }

    let header_end = raw.len() - after_header.len();
    let (after_hcs, hcs) = le_u16(after_header)?;
    let calculated = checksum(&raw[1..header_end]);
    if hcs != calculated {
        return Err(AmsError::InvalidChecksum {
            expected: hcs,
            calculated,
        });
    }

    // information runs up to the FCS, which sits right before the closing flag
    let fcs_start = raw.len() - 3;
    let info_start = raw.len() - after_hcs.len();
    if info_start > fcs_start {
        return Err(AmsError::FrameParse("frame has no room for an FCS".into()));
    }
    let (_, fcs) = le_u16(&raw[fcs_start..])?;
    let calculated = checksum(&raw[1..fcs_start]);
    if fcs != calculated {
        return Err(AmsError::InvalidChecksum {
            expected: fcs,
            calculated,
        });
    }

    let information = &raw[info_start..fcs_start];
    let information = information
        .strip_prefix(&LLC_HEADER[..])
        .ok_or_else(|| AmsError::FrameParse("missing LLC header".into()))?;

    Ok(HdlcFrame {
        segmented: format_hi & HDLC_SEGMENTATION_BIT != 0,
        destination,
        source,
        control,
        information: information.to_vec(),
    })
}

/// Wraps an APDU in an LLC header and a complete HDLC frame with valid
/// check sequences, the way a meter would push it.
pub fn pack_frame(apdu: &[u8]) -> Vec<u8> {
    let header_len = 2 + PACK_DESTINATION.len() + PACK_SOURCE.len() + 1;
    let length = header_len + 2 + LLC_HEADER.len() + apdu.len() + 2;

    let mut frame = Vec::with_capacity(length + 2);
    frame.push(HDLC_FLAG);
    frame.push(HDLC_FORMAT_TYPE_3 | ((length >> 8) as u8 & 0x07));
    frame.push(length as u8);
    frame.extend_from_slice(&PACK_DESTINATION);
    frame.extend_from_slice(&PACK_SOURCE);
    frame.push(PACK_CONTROL);

    let hcs = checksum(&frame[1..]);
    frame.extend_from_slice(&hcs.to_le_bytes());
    frame.extend_from_slice(&LLC_HEADER);
    frame.extend_from_slice(apdu);

    let fcs = checksum(&frame[1..]);
    frame.extend_from_slice(&fcs.to_le_bytes());
    frame.push(HDLC_FLAG);
    frame
}
