//! Golden frames: complete telegrams in the layout Kaifa meters push, with
//! check sequences computed independently of the crate's own packers.

use ams_han_mqtt::ams::{parse_frame, parse_message};
use ams_han_mqtt::util::hex::decode_hex;
use ams_han_mqtt::{AmsMessage, ByteSource, FrameDecoder, SensorIds, Telemetry};
use chrono::NaiveDate;
use tokio::sync::mpsc;

const LIST_1: &[&str] = &[
    "7EA027010201105A87E6E7000F40000000090C07E10A1406153B14FF80000002",
    "010600000394939D7E",
];

const LIST_2: &[&str] = &[
    "7EA079010201108093E6E7000F40000000090C07E10A1406153B0AFF80000002",
    "0D09074B464D5F30303109103639373036333134303137353339383509084D41",
    "333034483345060000039606000000000600000000060000003A0600000F3306",
    "00000C470600000BE5060000090F06000000000600000920CD8F7E",
];

const LIST_3: &[&str] = &[
    "7EA09B01020110EEAEE6E7000F40000000090C07E10A140616000AFF80000002",
    "1209074B464D5F30303109103639373036333134303137353339383509084D41",
    "333034483345060000039606000000000600000000060000003A0600000F3306",
    "00000C470600000BE5060000090F06000000000600000920090C07E10A140616",
    "0000FF8000000601B9918E060000000006000360D40600162934ABF07E",
];

/// Single phase list 2 without a header timestamp, voltage as long-unsigned.
const SINGLE_PHASE: &[&str] = &[
    "7EA05601020110ED99E6E7000F4000000000020909074B464D5F303031091036",
    "39373036333134303137353339383509084D4131303548324506000005AA0600",
    "000000060000000C0600000000060000003F1208FB0F587E",
];

fn golden(parts: &[&str]) -> Vec<u8> {
    decode_hex(&parts.concat()).unwrap()
}

fn decode(parts: &[&str]) -> AmsMessage {
    let frame = parse_frame(&golden(parts)).unwrap();
    parse_message(&frame.information).unwrap()
}

#[test]
fn test_list_1_header() {
    let frame = parse_frame(&golden(LIST_1)).unwrap();
    assert!(!frame.segmented);
    assert_eq!(frame.destination, vec![0x01]);
    assert_eq!(frame.source, vec![0x02, 0x01]);
    assert_eq!(frame.control, 0x10);
    assert_eq!(frame.information[0], 0x0F);
}

#[test]
fn test_list_1_active_power() {
    match decode(LIST_1) {
        AmsMessage::ActivePower(m) => {
            assert_eq!(m.act_pow_pos, 916);
            let expected = NaiveDate::from_ymd_opt(2017, 10, 20)
                .unwrap()
                .and_hms_opt(21, 59, 20)
                .unwrap();
            assert_eq!(m.date_time, Some(expected));
        }
        other => panic!("Unexpected message: {:?}", other),
    }
}

#[test]
fn test_list_2_three_phase() {
    match decode(LIST_2) {
        AmsMessage::ThreePhase(m) => {
            assert_eq!(m.meter.list_version, "KFM_001");
            assert_eq!(m.meter.meter_id, "6970631401753985");
            assert_eq!(m.meter.meter_type, "MA304H3E");
            assert_eq!(m.act_pow_pos, 918);
            assert_eq!(m.react_pow_neg, 58);
            assert_eq!((m.curr_l1, m.curr_l2, m.curr_l3), (3891, 3143, 3045));
            assert_eq!((m.volt_l1, m.volt_l2, m.volt_l3), (2319, 0, 2336));
        }
        other => panic!("Unexpected message: {:?}", other),
    }
}

#[test]
fn test_list_3_energy_registers() {
    match decode(LIST_3) {
        AmsMessage::ThreePhaseWithEnergy(m) => {
            assert_eq!(m.reading.act_pow_pos, 918);
            assert_eq!(m.energy.act_energy_pa, 28_938_638);
            assert_eq!(m.energy.act_energy_ma, 0);
            assert_eq!(m.energy.react_energy_pa, 221_396);
            assert_eq!(m.energy.react_energy_ma, 1_452_340);
            let expected = NaiveDate::from_ymd_opt(2017, 10, 20)
                .unwrap()
                .and_hms_opt(22, 0, 0)
                .unwrap();
            assert_eq!(m.energy.meter_time, Some(expected));
        }
        other => panic!("Unexpected message: {:?}", other),
    }
}

#[test]
fn test_single_phase_long_unsigned_voltage() {
    match decode(SINGLE_PHASE) {
        AmsMessage::SinglePhase(m) => {
            assert_eq!(m.date_time, None);
            assert_eq!(m.meter.meter_type, "MA105H2E");
            assert_eq!(m.act_pow_pos, 1450);
            assert_eq!(m.curr_l1, 63);
            assert_eq!(m.volt_l1, 2299);
        }
        other => panic!("Unexpected message: {:?}", other),
    }
}

#[test]
fn test_flipped_bit_is_rejected() {
    let mut raw = golden(LIST_2);
    raw[60] ^= 0x01;
    assert!(parse_frame(&raw).is_err());
}

#[tokio::test]
async fn test_golden_stream() {
    let mut stream = Vec::new();
    for parts in [LIST_1, LIST_3, LIST_2, SINGLE_PHASE] {
        stream.extend(golden(parts));
    }
    let (tx, rx) = mpsc::channel(stream.len());
    for byte in stream {
        tx.send(byte).await.unwrap();
    }
    drop(tx);

    let mut decoder = FrameDecoder::new(ByteSource::from_receiver(rx), false);
    let mut telemetry = Telemetry::new(SensorIds::default());
    let mut updates = Vec::new();
    for _ in 0..4 {
        let message = decoder.next().await.unwrap();
        updates.extend(telemetry.process(&message));
    }
    assert!(decoder.next().await.is_err());

    let svalues: Vec<_> = updates.iter().map(|u| (u.idx, u.svalue.as_str())).collect();
    assert_eq!(
        svalues,
        vec![
            (610, "389.1;314.3;304.5"),
            (613, "155.167"),
            (615, "918;28938638"),
        ]
    );
}
