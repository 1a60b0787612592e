use argus_gatt::{
    decode_csc_crank, decode_heart_rate_measurement, decode_power_measurement, CrankDecoder,
    CrankEncoder, PowerMeasurement,
};

fn power_frame_with_crank(power: i16, revs: u16, time: u16) -> Vec<u8> {
    let mut frame = 0x0020u16.to_le_bytes().to_vec();
    frame.extend_from_slice(&power.to_le_bytes());
    frame.extend_from_slice(&revs.to_le_bytes());
    frame.extend_from_slice(&time.to_le_bytes());
    frame
}

#[test]
fn heart_rate_reference_frames() {
    assert_eq!(decode_heart_rate_measurement(&[0x00, 0x64]), 100);
    assert_eq!(decode_heart_rate_measurement(&[0x01, 0x90, 0x00]), 144);
}

#[test]
fn power_cadence_survives_counter_wraparound() {
    let mut crank = CrankDecoder::new();
    let mut revs: u16 = 65_530;
    let mut time: u16 = 65_000;
    decode_power_measurement(&power_frame_with_crank(210, revs, time), &mut crank);

    for _ in 0..10 {
        revs = revs.wrapping_add(1);
        // 80 rpm -> 768 ticks per revolution
        time = time.wrapping_add(768);
        let m = decode_power_measurement(&power_frame_with_crank(210, revs, time), &mut crank);
        assert_eq!(m, PowerMeasurement { power: 210, cadence_rpm: 80 });
    }
    assert!(revs < 65_530, "revolution counter must have wrapped");
}

#[test]
fn emitted_csc_frames_reproduce_cadence() {
    for rpm in [30, 60, 85, 90, 110] {
        let mut encoder = CrankEncoder::new();
        let mut decoder = CrankDecoder::new();
        let mut last = 0;
        for _ in 0..200 {
            let frame = encoder.next_frame(rpm);
            let sample = decode_csc_crank(&frame).expect("crank data present");
            last = decoder.update(sample);
        }
        let rpm = rpm as u32;
        assert!(
            last == rpm || last == rpm + 1,
            "rpm {rpm} decoded as {last}"
        );
    }
}

#[test]
fn stalled_emitter_decodes_to_zero_after_hold() {
    let mut encoder = CrankEncoder::new();
    let mut decoder = CrankDecoder::new();
    for _ in 0..3 {
        decoder.update(decode_csc_crank(&encoder.next_frame(90)).unwrap());
    }
    let mut readings = Vec::new();
    for _ in 0..5 {
        readings.push(decoder.update(decode_csc_crank(&encoder.next_frame(0)).unwrap()));
    }
    assert_eq!(readings, vec![90, 90, 90, 0, 0]);
}
