//! AMS/HAN Protocol Constants
//!
//! This module defines constants used by the HDLC framing and DLMS/COSEM list
//! decoding of AMS/HAN meter telegrams, plus the defaults for the bridge itself.

/// HDLC opening and closing flag
pub const HDLC_FLAG: u8 = 0x7E;

/// Mask for the frame format type nibble
pub const HDLC_FORMAT_TYPE_MASK: u8 = 0xF0;

/// Frame format type 3
pub const HDLC_FORMAT_TYPE_3: u8 = 0xA0;

/// Mask for the upper three bits of the 11-bit frame length
pub const HDLC_LENGTH_HIGH_MASK: u8 = 0x07;

/// Segmentation bit in the frame format field
pub const HDLC_SEGMENTATION_BIT: u8 = 0x08;

/// Smallest legal length: format(2) + dest(1) + src(1) + control(1) + HCS(2) + FCS(2)
pub const HDLC_MIN_FRAME_LENGTH: usize = 9;

/// Maximum number of bytes in an HDLC address field
pub const HDLC_MAX_ADDRESS_LENGTH: usize = 4;

/// LLC header preceding the APDU (destination LSAP, source LSAP, quality)
pub const LLC_HEADER: [u8; 3] = [0xE6, 0xE7, 0x00];

/// APDU tag for a data-notification
pub const APDU_DATA_NOTIFICATION: u8 = 0x0F;

/// COSEM data type: null-data
pub const DLMS_NULL: u8 = 0x00;

/// COSEM data type: structure
pub const DLMS_STRUCTURE: u8 = 0x02;

/// COSEM data type: double-long-unsigned (u32)
pub const DLMS_DOUBLE_LONG_UNSIGNED: u8 = 0x06;

/// COSEM data type: octet-string
pub const DLMS_OCTET_STRING: u8 = 0x09;

/// COSEM data type: integer (i8)
pub const DLMS_INTEGER: u8 = 0x0F;

/// COSEM data type: long (i16)
pub const DLMS_LONG: u8 = 0x10;

/// COSEM data type: long-unsigned (u16)
pub const DLMS_LONG_UNSIGNED: u8 = 0x12;

/// COSEM data type: enum (u8)
pub const DLMS_ENUM: u8 = 0x16;

/// Length of an encoded COSEM date-time octet string
pub const DLMS_DATE_TIME_LENGTH: usize = 12;

/// List 1: active power only
pub const LIST_ACTIVE_POWER_ELEMENTS: usize = 1;

/// List 2 from a single phase meter
pub const LIST_SINGLE_PHASE_ELEMENTS: usize = 9;

/// List 2 from a three phase meter
pub const LIST_THREE_PHASE_ELEMENTS: usize = 13;

/// List 3 from a single phase meter
pub const LIST_SINGLE_PHASE_ENERGY_ELEMENTS: usize = 14;

/// List 3 from a three phase meter
pub const LIST_THREE_PHASE_ENERGY_ELEMENTS: usize = 18;

/// Domoticz command for updating a device
pub const UPDATE_DEVICE_COMMAND: &str = "udevice";

/// Default Domoticz index of the ampere sensor
pub const AMPERE_SENSOR_IDX: u32 = 610;

/// Default Domoticz index of the voltage sensor
pub const VOLT_SENSOR_IDX: u32 = 613;

/// Default Domoticz index of the usage (power + energy) sensor
pub const USAGE_SENSOR_IDX: u32 = 615;

/// Raw current units per ampere
pub const CURRENT_DIVIDER: f64 = 10.0;

/// Three phases times raw voltage units per volt
pub const VOLTAGE_DIVIDER: f64 = 30.0;

/// Default publish topic
pub const DEFAULT_TOPIC: &str = "domoticz/in";

/// Prefix of the generated MQTT client id
pub const CLIENT_ID_PREFIX: &str = "ams-han-mqtt-client-";

/// Serial read timeout in seconds
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// Capacity of the outbound payload queue
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Capacity of the byte channel between the serial reader and the decoder
pub const BYTE_CHANNEL_CAPACITY: usize = 1024;
