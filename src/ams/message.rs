//! # AMS/HAN List Decoding
//!
//! Meters push a DLMS "data-notification" APDU every few seconds:
//!
//! ```text
//! 0F | invoke-id (4) | 09 0C date-time (12) or 00 | 02 n | element * n
//! ```
//!
//! Each element is a typed COSEM value. The number of elements identifies the
//! list:
//!
//! | elements | list | content |
//! |---------:|------|---------|
//! | 1  | 1 | active import power |
//! | 9  | 2 | meter identity, powers, current and voltage of one phase |
//! | 13 | 2 | meter identity, powers, currents and voltages of three phases |
//! | 14 | 3 | single phase list 2, meter clock and energy registers |
//! | 18 | 3 | three phase list 2, meter clock and energy registers |

use crate::constants::{
    APDU_DATA_NOTIFICATION, DLMS_DATE_TIME_LENGTH, DLMS_DOUBLE_LONG_UNSIGNED, DLMS_ENUM,
    DLMS_INTEGER, DLMS_LONG, DLMS_LONG_UNSIGNED, DLMS_NULL, DLMS_OCTET_STRING, DLMS_STRUCTURE,
    LIST_ACTIVE_POWER_ELEMENTS, LIST_SINGLE_PHASE_ELEMENTS, LIST_SINGLE_PHASE_ENERGY_ELEMENTS,
    LIST_THREE_PHASE_ELEMENTS, LIST_THREE_PHASE_ENERGY_ELEMENTS,
};
use crate::error::AmsError;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use nom::{
    bytes::complete::{tag, take},
    combinator::map,
    error::{Error, ErrorKind},
    multi::{count, length_data},
    number::complete::{be_i16, be_i8, be_u16, be_u32, be_u8},
    IResult,
};
use serde::Serialize;

/// Invoke id and priority used when packing notifications
const PACK_INVOKE_ID: u32 = 0x4000_0000;

/// Identity block at the start of lists 2 and 3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeterInfo {
    pub list_version: String,
    pub meter_id: String,
    pub meter_type: String,
}

/// List 1: active import power only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivePower {
    pub date_time: Option<NaiveDateTime>,
    pub act_pow_pos: u32,
}

/// List 2 from a single phase meter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinglePhaseReading {
    pub date_time: Option<NaiveDateTime>,
    #[serde(flatten)]
    pub meter: MeterInfo,
    pub act_pow_pos: u32,
    pub act_pow_neg: u32,
    pub react_pow_pos: u32,
    pub react_pow_neg: u32,
    pub curr_l1: u32,
    pub volt_l1: u32,
}

/// List 2 from a three phase meter: the instantaneous reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreePhaseReading {
    pub date_time: Option<NaiveDateTime>,
    #[serde(flatten)]
    pub meter: MeterInfo,
    pub act_pow_pos: u32,
    pub act_pow_neg: u32,
    pub react_pow_pos: u32,
    pub react_pow_neg: u32,
    pub curr_l1: u32,
    pub curr_l2: u32,
    pub curr_l3: u32,
    pub volt_l1: u32,
    pub volt_l2: u32,
    pub volt_l3: u32,
}

/// Cumulative registers appended to list 3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnergyRegisters {
    pub meter_time: Option<NaiveDateTime>,
    /// Active import energy, the usage counter.
    pub act_energy_pa: u32,
    pub act_energy_ma: u32,
    pub react_energy_pa: u32,
    pub react_energy_ma: u32,
}

/// List 3 from a single phase meter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinglePhaseEnergyReading {
    #[serde(flatten)]
    pub reading: SinglePhaseReading,
    #[serde(flatten)]
    pub energy: EnergyRegisters,
}

/// List 3 from a three phase meter: carries the energy total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreePhaseEnergyReading {
    #[serde(flatten)]
    pub reading: ThreePhaseReading,
    #[serde(flatten)]
    pub energy: EnergyRegisters,
}

/// A decoded meter message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum AmsMessage {
    ActivePower(ActivePower),
    SinglePhase(SinglePhaseReading),
    ThreePhase(ThreePhaseReading),
    SinglePhaseWithEnergy(SinglePhaseEnergyReading),
    ThreePhaseWithEnergy(ThreePhaseEnergyReading),
}

impl AmsMessage {
    /// Short name of the message kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AmsMessage::ActivePower(_) => "active-power",
            AmsMessage::SinglePhase(_) => "single-phase",
            AmsMessage::ThreePhase(_) => "three-phase",
            AmsMessage::SinglePhaseWithEnergy(_) => "single-phase-energy",
            AmsMessage::ThreePhaseWithEnergy(_) => "three-phase-energy",
        }
    }

    /// Timestamp from the notification header, if the meter sent one.
    pub fn date_time(&self) -> Option<NaiveDateTime> {
        match self {
            AmsMessage::ActivePower(m) => m.date_time,
            AmsMessage::SinglePhase(m) => m.date_time,
            AmsMessage::ThreePhase(m) => m.date_time,
            AmsMessage::SinglePhaseWithEnergy(m) => m.reading.date_time,
            AmsMessage::ThreePhaseWithEnergy(m) => m.reading.date_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element<'a> {
    OctetString(&'a [u8]),
    DoubleLongUnsigned(u32),
    LongUnsigned(u16),
    Long(i16),
    Integer(i8),
    Enum(u8),
}

struct Notification<'a> {
    date_time: Option<NaiveDateTime>,
    elements: Vec<Element<'a>>,
}

fn element(input: &[u8]) -> IResult<&[u8], Element<'_>> {
    let (input, data_type) = be_u8(input)?;
    match data_type {
        DLMS_OCTET_STRING => {
            let (input, len) = be_u8(input)?;
            map(take(len), Element::OctetString)(input)
        }
        DLMS_DOUBLE_LONG_UNSIGNED => map(be_u32, Element::DoubleLongUnsigned)(input),
        DLMS_LONG_UNSIGNED => map(be_u16, Element::LongUnsigned)(input),
        DLMS_LONG => map(be_i16, Element::Long)(input),
        DLMS_INTEGER => map(be_i8, Element::Integer)(input),
        DLMS_ENUM => map(be_u8, Element::Enum)(input),
        _ => Err(nom::Err::Error(Error::new(input, ErrorKind::Switch))),
    }
}

fn notification(input: &[u8]) -> IResult<&[u8], Notification<'_>> {
    let (input, _) = tag(&[APDU_DATA_NOTIFICATION][..])(input)?;
    let (input, _invoke_id) = be_u32(input)?;

    let (input, marker) = be_u8(input)?;
    let (input, date_time) = match marker {
        DLMS_NULL => (input, None),
        DLMS_OCTET_STRING => {
            let (input, raw) = length_data(be_u8)(input)?;
            (input, decode_date_time(raw))
        }
        _ => return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag))),
    };

    let (input, _) = tag(&[DLMS_STRUCTURE][..])(input)?;
    let (input, n) = be_u8(input)?;
    let (input, elements) = count(element, n as usize)(input)?;

    Ok((input, Notification { date_time, elements }))
}

/// Decodes a COSEM date-time. Unspecified or out-of-range fields yield `None`.
pub fn decode_date_time(raw: &[u8]) -> Option<NaiveDateTime> {
    if raw.len() != DLMS_DATE_TIME_LENGTH {
        return None;
    }
    let year = u16::from_be_bytes([raw[0], raw[1]]);
    NaiveDate::from_ymd_opt(year.into(), raw[2].into(), raw[3].into())?.and_hms_opt(
        raw[5].into(),
        raw[6].into(),
        raw[7].into(),
    )
}

/// Encodes a COSEM date-time with unspecified hundredths and deviation.
pub fn encode_date_time(date_time: Option<NaiveDateTime>) -> [u8; DLMS_DATE_TIME_LENGTH] {
    let Some(dt) = date_time else {
        return [0xFF; DLMS_DATE_TIME_LENGTH];
    };
    let [year_hi, year_lo] = (dt.year() as u16).to_be_bytes();
    [
        year_hi,
        year_lo,
        dt.month() as u8,
        dt.day() as u8,
        dt.weekday().number_from_monday() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        0xFF,
        0x80,
        0x00,
        0x00,
    ]
}

/// Sequential typed access to list elements.
struct Fields<'a> {
    elements: std::vec::IntoIter<Element<'a>>,
    position: usize,
}

impl<'a> Fields<'a> {
    fn new(elements: Vec<Element<'a>>) -> Self {
        Fields {
            elements: elements.into_iter(),
            position: 0,
        }
    }

    fn next_element(&mut self) -> Result<Element<'a>, AmsError> {
        self.position += 1;
        self.elements
            .next()
            .ok_or_else(|| AmsError::FrameParse(format!("list ended before element {}", self.position)))
    }

    fn mismatch(&self, wanted: &str, found: Element<'_>) -> AmsError {
        AmsError::FrameParse(format!(
            "element {} should be {}, found {:?}",
            self.position, wanted, found
        ))
    }

    fn string(&mut self) -> Result<String, AmsError> {
        match self.next_element()? {
            Element::OctetString(raw) => Ok(String::from_utf8_lossy(raw).into_owned()),
            other => Err(self.mismatch("an octet-string", other)),
        }
    }

    fn number(&mut self) -> Result<u32, AmsError> {
        match self.next_element()? {
            Element::DoubleLongUnsigned(v) => Ok(v),
            Element::LongUnsigned(v) => Ok(v.into()),
            other => Err(self.mismatch("an unsigned number", other)),
        }
    }

    fn date_time(&mut self) -> Result<Option<NaiveDateTime>, AmsError> {
        match self.next_element()? {
            Element::OctetString(raw) => Ok(decode_date_time(raw)),
            other => Err(self.mismatch("a date-time", other)),
        }
    }

    fn meter_info(&mut self) -> Result<MeterInfo, AmsError> {
        Ok(MeterInfo {
            list_version: self.string()?,
            meter_id: self.string()?,
            meter_type: self.string()?,
        })
    }

    fn single_phase(&mut self, date_time: Option<NaiveDateTime>) -> Result<SinglePhaseReading, AmsError> {
        Ok(SinglePhaseReading {
            date_time,
            meter: self.meter_info()?,
            act_pow_pos: self.number()?,
            act_pow_neg: self.number()?,
            react_pow_pos: self.number()?,
            react_pow_neg: self.number()?,
            curr_l1: self.number()?,
            volt_l1: self.number()?,
        })
    }

    fn three_phase(&mut self, date_time: Option<NaiveDateTime>) -> Result<ThreePhaseReading, AmsError> {
        Ok(ThreePhaseReading {
            date_time,
            meter: self.meter_info()?,
            act_pow_pos: self.number()?,
            act_pow_neg: self.number()?,
            react_pow_pos: self.number()?,
            react_pow_neg: self.number()?,
            curr_l1: self.number()?,
            curr_l2: self.number()?,
            curr_l3: self.number()?,
            volt_l1: self.number()?,
            volt_l2: self.number()?,
            volt_l3: self.number()?,
        })
    }

    fn energy(&mut self) -> Result<EnergyRegisters, AmsError> {
        Ok(EnergyRegisters {
            meter_time: self.date_time()?,
            act_energy_pa: self.number()?,
            act_energy_ma: self.number()?,
            react_energy_pa: self.number()?,
            react_energy_ma: self.number()?,
        })
    }
}

/// Decodes the APDU of a verified frame into an [`AmsMessage`].
pub fn parse_message(apdu: &[u8]) -> Result<AmsMessage, AmsError> {
    let (_, Notification { date_time, elements }) = notification(apdu)?;
    let n = elements.len();
    let mut fields = Fields::new(elements);

    let message = match n {
        LIST_ACTIVE_POWER_ELEMENTS => AmsMessage::ActivePower(ActivePower {
            date_time,
            act_pow_pos: fields.number()?,
        }),
        LIST_SINGLE_PHASE_ELEMENTS => AmsMessage::SinglePhase(fields.single_phase(date_time)?),
        LIST_THREE_PHASE_ELEMENTS => AmsMessage::ThreePhase(fields.three_phase(date_time)?),
        LIST_SINGLE_PHASE_ENERGY_ELEMENTS => {
            AmsMessage::SinglePhaseWithEnergy(SinglePhaseEnergyReading {
                reading: fields.single_phase(date_time)?,
                energy: fields.energy()?,
            })
        }
        LIST_THREE_PHASE_ENERGY_ELEMENTS => AmsMessage::ThreePhaseWithEnergy(ThreePhaseEnergyReading {
            reading: fields.three_phase(date_time)?,
            energy: fields.energy()?,
        }),
        other => return Err(AmsError::UnknownMessage(other)),
    };

    Ok(message)
}

/// Builds list element bytes while counting them.
#[derive(Default)]
struct Packer {
    body: Vec<u8>,
    elements: u8,
}

impl Packer {
    fn string(&mut self, value: &str) {
        self.body.push(DLMS_OCTET_STRING);
        self.body.push(value.len() as u8);
        self.body.extend_from_slice(value.as_bytes());
        self.elements += 1;
    }

    fn number(&mut self, value: u32) {
        self.body.push(DLMS_DOUBLE_LONG_UNSIGNED);
        self.body.extend_from_slice(&value.to_be_bytes());
        self.elements += 1;
    }

    fn date_time(&mut self, value: Option<NaiveDateTime>) {
        self.body.push(DLMS_OCTET_STRING);
        self.body.push(DLMS_DATE_TIME_LENGTH as u8);
        self.body.extend_from_slice(&encode_date_time(value));
        self.elements += 1;
    }

    fn meter_info(&mut self, meter: &MeterInfo) {
        self.string(&meter.list_version);
        self.string(&meter.meter_id);
        self.string(&meter.meter_type);
    }

    fn powers(&mut self, values: [u32; 4]) {
        values.into_iter().for_each(|v| self.number(v));
    }

    fn single_phase(&mut self, m: &SinglePhaseReading) {
        self.meter_info(&m.meter);
        self.powers([m.act_pow_pos, m.act_pow_neg, m.react_pow_pos, m.react_pow_neg]);
        self.number(m.curr_l1);
        self.number(m.volt_l1);
    }

    fn three_phase(&mut self, m: &ThreePhaseReading) {
        self.meter_info(&m.meter);
        self.powers([m.act_pow_pos, m.act_pow_neg, m.react_pow_pos, m.react_pow_neg]);
        for v in [m.curr_l1, m.curr_l2, m.curr_l3, m.volt_l1, m.volt_l2, m.volt_l3] {
            self.number(v);
        }
    }

    fn energy(&mut self, e: &EnergyRegisters) {
        self.date_time(e.meter_time);
        self.powers([e.act_energy_pa, e.act_energy_ma, e.react_energy_pa, e.react_energy_ma]);
    }
}

/// Encodes a message as the data-notification APDU a meter would send.
pub fn pack_message(message: &AmsMessage) -> Vec<u8> {
    let mut packer = Packer::default();
    match message {
        AmsMessage::ActivePower(m) => packer.number(m.act_pow_pos),
        AmsMessage::SinglePhase(m) => packer.single_phase(m),
        AmsMessage::ThreePhase(m) => packer.three_phase(m),
        AmsMessage::SinglePhaseWithEnergy(m) => {
            packer.single_phase(&m.reading);
            packer.energy(&m.energy);
        }
        AmsMessage::ThreePhaseWithEnergy(m) => {
            packer.three_phase(&m.reading);
            packer.energy(&m.energy);
        }
    }

    let mut apdu = vec![APDU_DATA_NOTIFICATION];
    apdu.extend_from_slice(&PACK_INVOKE_ID.to_be_bytes());
    match message.date_time() {
        Some(dt) => {
            apdu.push(DLMS_OCTET_STRING);
            apdu.push(DLMS_DATE_TIME_LENGTH as u8);
            apdu.extend_from_slice(&encode_date_time(Some(dt)));
        }
        None => apdu.push(DLMS_NULL),
    }
    apdu.push(DLMS_STRUCTURE);
    apdu.push(packer.elements);
    apdu.extend_from_slice(&packer.body);
    apdu
}
