use argus_gatt::crank::MAX_PLAUSIBLE_RPM;
use argus_gatt::{
    decode_csc_crank, decode_heart_rate_measurement, decode_power_measurement,
    parse_power_measurement, CrankDecoder,
};

fn xorshift64(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut s = seed.max(1);
    let mut out = vec![0_u8; len];
    for b in &mut out {
        *b = (xorshift64(&mut s) & 0xFF) as u8;
    }
    out
}

#[test]
fn fuzz_like_decoders_never_panic_or_go_negative() {
    let mut crank = CrankDecoder::new();
    for i in 0..5000_u64 {
        let len = ((i as usize) * 7) % 24;
        let buf = random_bytes(0xA7605 ^ i, len);

        let lenient = decode_power_measurement(&buf, &mut crank);
        assert!(lenient.power >= 0);
        assert!(lenient.cadence_rpm >= 0);
        assert!(lenient.cadence_rpm as u32 <= MAX_PLAUSIBLE_RPM);
        if let Ok(strict) = parse_power_measurement(&buf, &mut CrankDecoder::new()) {
            assert_eq!(strict.power, lenient.power);
        }

        let _ = decode_heart_rate_measurement(&buf);
        let _ = decode_csc_crank(&buf);
    }
}
