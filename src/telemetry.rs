//! # Telemetry Transformer
//!
//! Turns decoded meter messages into Domoticz `udevice` commands.
//!
//! Only two message kinds drive output:
//! - a three phase list 2 ([`AmsMessage::ThreePhase`]) yields a current update,
//!   a voltage update and, once an energy counter is known, a usage update;
//! - a three phase list 3 ([`AmsMessage::ThreePhaseWithEnergy`]) only records
//!   the active import energy counter. It is reported with the next list 2.
//!
//! The counter is never expired, so a meter that stops sending list 3 keeps
//! the last counter on every usage update.

use crate::ams::message::{AmsMessage, ThreePhaseReading};
use crate::constants::{
    AMPERE_SENSOR_IDX, CURRENT_DIVIDER, UPDATE_DEVICE_COMMAND, USAGE_SENSOR_IDX, VOLTAGE_DIVIDER,
    VOLT_SENSOR_IDX,
};
use log::debug;
use serde::Serialize;

/// Domoticz device indexes of the three sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorIds {
    pub current: u32,
    pub voltage: u32,
    pub usage: u32,
}

impl Default for SensorIds {
    fn default() -> Self {
        SensorIds {
            current: AMPERE_SENSOR_IDX,
            voltage: VOLT_SENSOR_IDX,
            usage: USAGE_SENSOR_IDX,
        }
    }
}

/// A Domoticz device update command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorUpdate {
    pub command: &'static str,
    pub idx: u32,
    pub nvalue: i32,
    pub svalue: String,
}

impl SensorUpdate {
    pub fn new(idx: u32, svalue: String) -> Self {
        SensorUpdate {
            command: UPDATE_DEVICE_COMMAND,
            idx,
            nvalue: 0,
            svalue,
        }
    }
}

/// Per-phase currents in amperes, one decimal each, joined by semicolons.
pub fn format_currents(l1: u32, l2: u32, l3: u32) -> String {
    format!(
        "{:.1};{:.1};{:.1}",
        f64::from(l1) / CURRENT_DIVIDER,
        f64::from(l2) / CURRENT_DIVIDER,
        f64::from(l3) / CURRENT_DIVIDER
    )
}

/// Mean line voltage with three decimals.
pub fn format_voltage(l1: u32, l2: u32, l3: u32) -> String {
    let sum = u64::from(l1) + u64::from(l2) + u64::from(l3);
    format!("{:.3}", sum as f64 / VOLTAGE_DIVIDER)
}

/// Instantaneous power and energy counter as `"<power>;<counter>"`.
pub fn format_usage(power: u32, counter: u32) -> String {
    format!("{};{}", power, counter)
}

/// Stateful message to sensor update transformation.
#[derive(Debug, Default)]
pub struct Telemetry {
    sensors: SensorIds,
    usage_counter: Option<u32>,
}

impl Telemetry {
    pub fn new(sensors: SensorIds) -> Self {
        Telemetry {
            sensors,
            usage_counter: None,
        }
    }

    /// The last active import energy counter seen, if any.
    pub fn usage_counter(&self) -> Option<u32> {
        self.usage_counter
    }

    /// Processes one message, returning updates in publish order.
    pub fn process(&mut self, message: &AmsMessage) -> Vec<SensorUpdate> {
        match message {
            AmsMessage::ThreePhase(reading) => self.instantaneous(reading),
            AmsMessage::ThreePhaseWithEnergy(reading) => {
                self.usage_counter = Some(reading.energy.act_energy_pa);
                debug!("usage counter is now {}", reading.energy.act_energy_pa);
                Vec::new()
            }
            AmsMessage::ActivePower(_)
            | AmsMessage::SinglePhase(_)
            | AmsMessage::SinglePhaseWithEnergy(_) => Vec::new(),
        }
    }

    fn instantaneous(&self, reading: &ThreePhaseReading) -> Vec<SensorUpdate> {
        let mut updates = vec![
            SensorUpdate::new(
                self.sensors.current,
                format_currents(reading.curr_l1, reading.curr_l2, reading.curr_l3),
            ),
            SensorUpdate::new(
                self.sensors.voltage,
                format_voltage(reading.volt_l1, reading.volt_l2, reading.volt_l3),
            ),
        ];

        if let Some(counter) = self.usage_counter {
            updates.push(SensorUpdate::new(
                self.sensors.usage,
                format_usage(reading.act_pow_pos, counter),
            ));
        }

        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ams::message::{ActivePower, EnergyRegisters, MeterInfo, ThreePhaseEnergyReading};
    use proptest::prelude::*;

    fn reading(currents: [u32; 3], voltages: [u32; 3], power: u32) -> ThreePhaseReading {
        ThreePhaseReading {
            date_time: None,
            meter: MeterInfo {
                list_version: "Kfm_001".into(),
                meter_id: "6970631401234567".into(),
                meter_type: "MA304H3E".into(),
            },
            act_pow_pos: power,
            act_pow_neg: 0,
            react_pow_pos: 0,
            react_pow_neg: 0,
            curr_l1: currents[0],
            curr_l2: currents[1],
            curr_l3: currents[2],
            volt_l1: voltages[0],
            volt_l2: voltages[1],
            volt_l3: voltages[2],
        }
    }

    fn energy(counter: u32) -> AmsMessage {
        AmsMessage::ThreePhaseWithEnergy(ThreePhaseEnergyReading {
            reading: reading([1, 2, 3], [2300, 2300, 2300], 1),
            energy: EnergyRegisters {
                meter_time: None,
                act_energy_pa: counter,
                act_energy_ma: 0,
                react_energy_pa: 0,
                react_energy_ma: 0,
            },
        })
    }

    #[test]
    fn test_formatting_examples() {
        assert_eq!(format_currents(123, 45, 67), "12.3;4.5;6.7");
        assert_eq!(format_voltage(2300, 2310, 2305), "230.500");
        assert_eq!(format_usage(340, 500), "340;500");
    }

    #[test]
    fn test_no_usage_without_energy_total() {
        let mut telemetry = Telemetry::default();
        let updates = telemetry.process(&AmsMessage::ThreePhase(reading(
            [123, 45, 67],
            [2300, 2310, 2305],
            340,
        )));

        assert_eq!(
            updates,
            vec![
                SensorUpdate::new(610, "12.3;4.5;6.7".into()),
                SensorUpdate::new(613, "230.500".into()),
            ]
        );
    }

    #[test]
    fn test_usage_after_energy_total() {
        let mut telemetry = Telemetry::default();
        assert!(telemetry.process(&energy(500)).is_empty());
        assert_eq!(telemetry.usage_counter(), Some(500));

        let updates = telemetry.process(&AmsMessage::ThreePhase(reading(
            [123, 45, 67],
            [2300, 2310, 2305],
            340,
        )));
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[2], SensorUpdate::new(615, "340;500".into()));
    }

    #[test]
    fn test_last_energy_total_wins() {
        let mut telemetry = Telemetry::default();
        telemetry.process(&energy(500));
        telemetry.process(&energy(0));
        telemetry.process(&energy(812));

        let updates = telemetry.process(&AmsMessage::ThreePhase(reading([0; 3], [0; 3], 7)));
        assert_eq!(updates[2].svalue, "7;812");
    }

    #[test]
    fn test_zero_counter_is_reported() {
        let mut telemetry = Telemetry::default();
        telemetry.process(&energy(0));

        let updates = telemetry.process(&AmsMessage::ThreePhase(reading([0; 3], [0; 3], 7)));
        assert_eq!(updates[2].svalue, "7;0");
    }

    #[test]
    fn test_other_kinds_are_ignored() {
        let mut telemetry = Telemetry::default();
        let updates = telemetry.process(&AmsMessage::ActivePower(ActivePower {
            date_time: None,
            act_pow_pos: 1200,
        }));
        assert!(updates.is_empty());
        assert_eq!(telemetry.usage_counter(), None);
    }

    #[test]
    fn test_custom_sensor_ids() {
        let mut telemetry = Telemetry::new(SensorIds {
            current: 1,
            voltage: 2,
            usage: 3,
        });
        telemetry.process(&energy(9));
        let ids: Vec<u32> = telemetry
            .process(&AmsMessage::ThreePhase(reading([0; 3], [0; 3], 0)))
            .iter()
            .map(|u| u.idx)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_payload_json() {
        let update = SensorUpdate::new(610, "12.3;4.5;6.7".into());
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"command":"udevice","idx":610,"nvalue":0,"svalue":"12.3;4.5;6.7"}"#
        );
    }

    proptest! {
        #[test]
        fn prop_currents_have_one_decimal(l1 in 0u32..1_000_000, l2 in 0u32..1_000_000, l3 in 0u32..1_000_000) {
            let formatted = format_currents(l1, l2, l3);
            let parts: Vec<&str> = formatted.split(';').collect();
            prop_assert_eq!(parts.len(), 3);
            for (part, raw) in parts.iter().zip([l1, l2, l3]) {
                prop_assert_eq!(part.to_string(), format!("{}.{}", raw / 10, raw % 10));
            }
        }

        #[test]
        fn prop_voltage_is_mean_of_sum(v1 in 0u32..100_000, v2 in 0u32..100_000, v3 in 0u32..100_000) {
            let formatted = format_voltage(v1, v2, v3);
            let (_, decimals) = formatted.split_once('.').unwrap();
            prop_assert_eq!(decimals.len(), 3);
            let value: f64 = formatted.parse().unwrap();
            let expected = (f64::from(v1) + f64::from(v2) + f64::from(v3)) / 30.0;
            prop_assert!((value - expected).abs() <= 0.0005 + f64::EPSILON * expected);
        }
    }
}
