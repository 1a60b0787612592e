//! Cycling Power Measurement (0x2A63).

use serde::{Deserialize, Serialize};

use crate::crank::{CrankDecoder, CrankSample};
use crate::error::CodecError;

const FLAG_PEDAL_BALANCE: u16 = 1 << 0;
const FLAG_ACCUMULATED_TORQUE: u16 = 1 << 2;
const FLAG_WHEEL_REVOLUTION: u16 = 1 << 4;
const FLAG_CRANK_REVOLUTION: u16 = 1 << 5;

/// Flags (u16) plus instantaneous power (i16).
pub const POWER_MEASUREMENT_MIN_LEN: usize = 4;

/// Decoded power notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerMeasurement {
    /// Instantaneous power in watts, never negative.
    pub power: i32,
    /// Cadence derived from crank data, 0 when absent.
    pub cadence_rpm: i32,
}

struct RawFrame {
    power: i32,
    crank: Result<Option<CrankSample>, CodecError>,
}

fn split_frame(buf: &[u8]) -> Result<RawFrame, CodecError> {
    if buf.len() < POWER_MEASUREMENT_MIN_LEN {
        return Err(CodecError::Truncated {
            need: POWER_MEASUREMENT_MIN_LEN,
            got: buf.len(),
        });
    }
    let flags = u16::from_le_bytes([buf[0], buf[1]]);
    let power = i16::from_le_bytes([buf[2], buf[3]]).max(0);

    let mut offset = POWER_MEASUREMENT_MIN_LEN;
    if flags & FLAG_PEDAL_BALANCE != 0 {
        offset += 1;
    }
    if flags & FLAG_ACCUMULATED_TORQUE != 0 {
        offset += 2;
    }
    if flags & FLAG_WHEEL_REVOLUTION != 0 {
        offset += 6;
    }

    let crank = if flags & FLAG_CRANK_REVOLUTION == 0 {
        Ok(None)
    } else {
        match buf.get(offset..offset + 4) {
            Some(field) => Ok(Some(CrankSample {
                cumulative_revs: u16::from_le_bytes([field[0], field[1]]),
                last_event_time: u16::from_le_bytes([field[2], field[3]]),
            })),
            None => Err(CodecError::MissingField("crank revolution data")),
        }
    };

    Ok(RawFrame {
        power: i32::from(power),
        crank,
    })
}

/// Strict decode: rejects short frames and frames whose flags promise crank
/// data the payload does not carry.
pub fn parse_power_measurement(
    buf: &[u8],
    crank: &mut CrankDecoder,
) -> Result<PowerMeasurement, CodecError> {
    let frame = split_frame(buf)?;
    let cadence_rpm = match frame.crank? {
        Some(sample) => i32::try_from(crank.update(sample)).unwrap_or(0),
        None => 0,
    };
    Ok(PowerMeasurement {
        power: frame.power,
        cadence_rpm,
    })
}

/// Lenient decode used on the notification path. Fails soft to zeros.
pub fn decode_power_measurement(buf: &[u8], crank: &mut CrankDecoder) -> PowerMeasurement {
    let Ok(frame) = split_frame(buf) else {
        return PowerMeasurement::default();
    };
    let cadence_rpm = match frame.crank {
        Ok(Some(sample)) => i32::try_from(crank.update(sample)).unwrap_or(0),
        _ => 0,
    };
    PowerMeasurement {
        power: frame.power,
        cadence_rpm,
    }
}

/// Encodes a minimal measurement: zero flags and power saturated to i16.
pub fn encode_power_measurement(watts: i32) -> [u8; POWER_MEASUREMENT_MIN_LEN] {
    let clamped = watts.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
    let power = clamped.to_le_bytes();
    [0x00, 0x00, power[0], power[1]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_frames_fail_soft() {
        let mut crank = CrankDecoder::new();
        assert_eq!(decode_power_measurement(&[], &mut crank), PowerMeasurement::default());
        assert_eq!(
            decode_power_measurement(&[0x00, 0x00, 0xC8], &mut crank),
            PowerMeasurement::default()
        );
        assert_eq!(
            parse_power_measurement(&[0x00, 0x00, 0xC8], &mut crank),
            Err(CodecError::Truncated { need: 4, got: 3 })
        );
    }

    #[test]
    fn negative_power_is_clamped() {
        let mut crank = CrankDecoder::new();
        let frame = encode_power_measurement(-50);
        assert_eq!(decode_power_measurement(&frame, &mut crank).power, 0);
    }

    #[test]
    fn encode_saturates() {
        assert_eq!(encode_power_measurement(250), [0, 0, 0xFA, 0x00]);
        assert_eq!(encode_power_measurement(100_000), [0, 0, 0xFF, 0x7F]);
    }

    #[test]
    fn crank_field_found_after_optional_blocks() {
        let mut crank = CrankDecoder::new();
        // balance + torque + wheel + crank
        let flags: u16 = 0b11_0101;
        let mut frame = flags.to_le_bytes().to_vec();
        frame.extend_from_slice(&200i16.to_le_bytes());
        frame.push(50);
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&[0; 6]);
        frame.extend_from_slice(&10u16.to_le_bytes());
        frame.extend_from_slice(&0u16.to_le_bytes());
        assert_eq!(
            decode_power_measurement(&frame, &mut crank),
            PowerMeasurement { power: 200, cadence_rpm: 0 }
        );

        let len = frame.len();
        frame[len - 4..len - 2].copy_from_slice(&11u16.to_le_bytes());
        frame[len - 2..].copy_from_slice(&1024u16.to_le_bytes());
        assert_eq!(
            decode_power_measurement(&frame, &mut crank),
            PowerMeasurement { power: 200, cadence_rpm: 60 }
        );
    }

    #[test]
    fn corrupt_crank_jump_never_goes_negative() {
        let mut crank = CrankDecoder::new();
        let frame = |revs: u16, time: u16| {
            let mut f = 0x0020u16.to_le_bytes().to_vec();
            f.extend_from_slice(&180i16.to_le_bytes());
            f.extend_from_slice(&revs.to_le_bytes());
            f.extend_from_slice(&time.to_le_bytes());
            f
        };
        decode_power_measurement(&frame(0, 0), &mut crank);
        assert_eq!(
            decode_power_measurement(&frame(40_000, 1), &mut crank),
            PowerMeasurement { power: 180, cadence_rpm: 0 }
        );
    }

    #[test]
    fn truncated_crank_keeps_power() {
        let mut crank = CrankDecoder::new();
        let frame = [0x20, 0x00, 0x64, 0x00, 0x01];
        assert_eq!(
            decode_power_measurement(&frame, &mut crank),
            PowerMeasurement { power: 100, cadence_rpm: 0 }
        );
        assert_eq!(
            parse_power_measurement(&frame, &mut crank),
            Err(CodecError::MissingField("crank revolution data"))
        );
    }
}
