//! Heart Rate Measurement (0x2A37).

use crate::error::CodecError;

const FLAG_HR_U16: u8 = 0x01;

/// Strict decode of the heart rate value.
pub fn parse_heart_rate_measurement(buf: &[u8]) -> Result<u16, CodecError> {
    let (&flags, rest) = buf.split_first().ok_or(CodecError::Truncated { need: 2, got: 0 })?;
    if flags & FLAG_HR_U16 == 0 {
        rest.first()
            .map(|&bpm| u16::from(bpm))
            .ok_or(CodecError::Truncated { need: 2, got: buf.len() })
    } else {
        match rest.get(..2) {
            Some(v) => Ok(u16::from_le_bytes([v[0], v[1]])),
            None => Err(CodecError::Truncated { need: 3, got: buf.len() }),
        }
    }
}

/// Lenient decode: 0 for anything malformed.
pub fn decode_heart_rate_measurement(buf: &[u8]) -> u16 {
    parse_heart_rate_measurement(buf).unwrap_or(0)
}

/// Encodes an 8-bit measurement with zero flags.
pub fn encode_heart_rate(bpm: i32) -> [u8; 2] {
    [0x00, bpm.clamp(0, 255) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_both_widths() {
        assert_eq!(decode_heart_rate_measurement(&[0x00, 0x64]), 100);
        assert_eq!(decode_heart_rate_measurement(&[0x01, 0x90, 0x00]), 144);
        assert_eq!(decode_heart_rate_measurement(&[0x01, 0x2C, 0x01]), 300);
    }

    #[test]
    fn malformed_frames_are_zero() {
        assert_eq!(decode_heart_rate_measurement(&[]), 0);
        assert_eq!(decode_heart_rate_measurement(&[0x00]), 0);
        assert_eq!(decode_heart_rate_measurement(&[0x01, 0x90]), 0);
        assert_eq!(
            parse_heart_rate_measurement(&[0x01, 0x90]),
            Err(CodecError::Truncated { need: 3, got: 2 })
        );
    }

    #[test]
    fn encode_clamps() {
        assert_eq!(encode_heart_rate(72), [0x00, 72]);
        assert_eq!(encode_heart_rate(-4), [0x00, 0]);
        assert_eq!(encode_heart_rate(400), [0x00, 255]);
    }
}
