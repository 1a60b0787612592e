//! Crank revolution bookkeeping shared by the power decoder and the CSC emitter.

use serde::{Deserialize, Serialize};

/// Crank event times are expressed in 1/1024 s.
pub const CRANK_TIME_UNITS_PER_SEC: u32 = 1024;
/// CSC Measurement flag: wheel revolution data present.
pub const CSC_FLAG_WHEEL_DATA: u8 = 0x01;
/// CSC Measurement flag: crank revolution data present.
pub const CSC_FLAG_CRANK_DATA: u8 = 0x02;
/// Length of an emitted crank-only CSC Measurement frame.
pub const CSC_CRANK_FRAME_LEN: usize = 5;

/// Number of unchanged crank samples that still report the last cadence.
const MAX_HELD_REPEATS: u8 = 3;
/// Derived cadences above this are treated as corrupt samples.
pub const MAX_PLAUSIBLE_RPM: u32 = 250;

/// Cumulative crank revolutions and last crank event time, both wrapping u16.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrankSample {
    pub cumulative_revs: u16,
    pub last_event_time: u16,
}

/// Decode-side crank state: derives RPM from consecutive samples.
#[derive(Debug, Clone, Default)]
pub struct CrankDecoder {
    previous: Option<CrankSample>,
    last_rpm: u32,
    repeats: u8,
}

impl CrankDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the previous sample, e.g. when a new sensor session starts.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feeds one sample and returns the derived cadence in RPM.
    ///
    /// The first sample after a reset has no reference and yields 0.
    /// A sample without a new crank event keeps the last cadence for a few
    /// notifications, then falls to 0.
    pub fn update(&mut self, sample: CrankSample) -> u32 {
        let Some(prev) = self.previous.replace(sample) else {
            self.last_rpm = 0;
            self.repeats = 0;
            return 0;
        };

        let d_revs = u32::from(sample.cumulative_revs.wrapping_sub(prev.cumulative_revs));
        let d_time = u32::from(sample.last_event_time.wrapping_sub(prev.last_event_time));

        if d_time == 0 {
            if d_revs == 0 {
                self.repeats = self.repeats.saturating_add(1);
                if self.repeats > MAX_HELD_REPEATS {
                    self.last_rpm = 0;
                }
            }
            return self.last_rpm;
        }

        self.repeats = 0;
        let rpm = u64::from(d_revs) * u64::from(CRANK_TIME_UNITS_PER_SEC) * 60 / u64::from(d_time);
        self.last_rpm = match u32::try_from(rpm) {
            Ok(rpm) if rpm <= MAX_PLAUSIBLE_RPM => rpm,
            _ => 0,
        };
        self.last_rpm
    }
}

/// Emit-side crank state for the virtual CSC characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrankEncoder {
    sample: CrankSample,
}

impl CrankEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&self) -> CrankSample {
        self.sample
    }

    /// Advances one revolution at `rpm`; stalls while `rpm <= 0`.
    pub fn advance(&mut self, rpm: i32) -> CrankSample {
        if rpm > 0 {
            let period = (60 * CRANK_TIME_UNITS_PER_SEC) / rpm as u32;
            self.sample.cumulative_revs = self.sample.cumulative_revs.wrapping_add(1);
            self.sample.last_event_time = self.sample.last_event_time.wrapping_add(period as u16);
        }
        self.sample
    }

    /// Advances and encodes the resulting CSC Measurement frame.
    pub fn next_frame(&mut self, rpm: i32) -> [u8; CSC_CRANK_FRAME_LEN] {
        let sample = self.advance(rpm);
        encode_crank_cadence(sample.cumulative_revs, sample.last_event_time)
    }
}

/// Encodes a crank-only CSC Measurement frame.
pub fn encode_crank_cadence(cumulative_revs: u16, last_event_time: u16) -> [u8; CSC_CRANK_FRAME_LEN] {
    let revs = cumulative_revs.to_le_bytes();
    let time = last_event_time.to_le_bytes();
    [CSC_FLAG_CRANK_DATA, revs[0], revs[1], time[0], time[1]]
}

/// Extracts the crank sample from a CSC Measurement frame, if present.
pub fn decode_csc_crank(buf: &[u8]) -> Option<CrankSample> {
    let flags = *buf.first()?;
    if flags & CSC_FLAG_CRANK_DATA == 0 {
        return None;
    }
    let mut offset = 1;
    if flags & CSC_FLAG_WHEEL_DATA != 0 {
        offset += 6;
    }
    let field = buf.get(offset..offset + 4)?;
    Some(CrankSample {
        cumulative_revs: u16::from_le_bytes([field[0], field[1]]),
        last_event_time: u16::from_le_bytes([field[2], field[3]]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(revs: u16, time: u16) -> CrankSample {
        CrankSample {
            cumulative_revs: revs,
            last_event_time: time,
        }
    }

    #[test]
    fn first_sample_has_no_cadence() {
        let mut dec = CrankDecoder::new();
        assert_eq!(dec.update(sample(10, 1000)), 0);
    }

    #[test]
    fn derives_rpm_from_delta() {
        let mut dec = CrankDecoder::new();
        dec.update(sample(10, 0));
        // 2 revs in 1.333 s -> 90 rpm
        assert_eq!(dec.update(sample(12, 1365)), 90);
    }

    #[test]
    fn handles_wraparound_on_both_counters() {
        let mut dec = CrankDecoder::new();
        dec.update(sample(u16::MAX, u16::MAX - 200));
        // +1 rev, +683 ticks across the wrap -> ~89.9 rpm
        assert_eq!(dec.update(sample(0, 482)), 89);
    }

    #[test]
    fn repeated_sample_holds_then_drops_to_zero() {
        let mut dec = CrankDecoder::new();
        dec.update(sample(1, 0));
        assert_eq!(dec.update(sample(2, 1024)), 60);
        assert_eq!(dec.update(sample(2, 1024)), 60);
        assert_eq!(dec.update(sample(2, 1024)), 60);
        assert_eq!(dec.update(sample(2, 1024)), 60);
        assert_eq!(dec.update(sample(2, 1024)), 0);
    }

    #[test]
    fn implausible_jump_reads_as_stopped() {
        let mut dec = CrankDecoder::new();
        dec.update(sample(0, 0));
        assert_eq!(dec.update(sample(40_000, 1)), 0);
        // A sane follow-up sample recovers.
        assert_eq!(dec.update(sample(40_001, 1025)), 60);
    }

    #[test]
    fn reset_forgets_reference() {
        let mut dec = CrankDecoder::new();
        dec.update(sample(1, 0));
        dec.reset();
        assert_eq!(dec.update(sample(2, 1024)), 0);
    }

    #[test]
    fn encoder_stalls_at_zero_cadence() {
        let mut enc = CrankEncoder::new();
        let first = enc.advance(90);
        assert_eq!(first.cumulative_revs, 1);
        assert_eq!(first.last_event_time, 682);
        let stalled = enc.advance(0);
        assert_eq!(stalled, first);
    }

    #[test]
    fn encoded_frame_layout() {
        assert_eq!(encode_crank_cadence(0x0102, 0x0304), [0x02, 0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn csc_decoder_skips_wheel_block() {
        let frame = [0x03, 1, 0, 0, 0, 0x10, 0x00, 0x05, 0x00, 0x00, 0x04];
        assert_eq!(decode_csc_crank(&frame), Some(sample(5, 0x0400)));
        assert_eq!(decode_csc_crank(&[0x01, 1, 0, 0, 0, 0, 0]), None);
        assert_eq!(decode_csc_crank(&[0x02, 1, 0]), None);
    }
}
