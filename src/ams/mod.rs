//! The ams module contains everything between the serial adapter and a decoded
//! meter message: the byte stream, HDLC framing, check sequence verification
//! and the DLMS list decoder.

pub mod decoder;
pub mod frame;
pub mod hdlc;
pub mod message;
pub mod serial;
pub mod serial_mock;

pub use decoder::FrameDecoder;
pub use frame::{pack_frame, parse_frame, HdlcFrame};
pub use hdlc::FrameReader;
pub use message::{
    pack_message, parse_message, ActivePower, AmsMessage, EnergyRegisters, MeterInfo,
    SinglePhaseEnergyReading, SinglePhaseReading, ThreePhaseEnergyReading, ThreePhaseReading,
};
pub use serial::{ByteSource, Parity, SerialConfig};
