//! Once-per-tick derivation of the emitted telemetry.

use std::ops::RangeInclusive;

use argus_core::{OperatingMode, OutputTelemetry, MAX_HEART_RATE_BPM};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::state::{TelemetrySnapshot, TelemetryStore};

/// Used when the configured simulation base is 0.
pub const SIM_FALLBACK_BASE_POWER: i32 = 150;
pub const NOISE_RANGE: RangeInclusive<i32> = -3..=3;

const SIM_CADENCE_RPM: i32 = 90;
const SIM_HR_BASE: i32 = 70;
const BRIDGE_HR_BASE: i32 = 65;
const ESTIMATED_CADENCE_BASE: i32 = 60;
const ESTIMATED_CADENCE_CAP: i32 = 100;

/// Computes outputs for one tick. Pure given `noise`.
pub fn derive_outputs(t: &TelemetrySnapshot, noise: i32) -> OutputTelemetry {
    let mut out = match t.mode {
        OperatingMode::Simulation => {
            let base = if t.sim_base_power == 0 {
                SIM_FALLBACK_BASE_POWER
            } else {
                t.sim_base_power
            };
            let power = base + noise;
            let cadence = if power > 0 {
                SIM_CADENCE_RPM + noise / 2
            } else {
                0
            };
            let heart_rate = if t.connected_heart_rate_sensor && t.real_heart_rate > 0 {
                t.real_heart_rate
            } else {
                SIM_HR_BASE + power / 3
            };
            OutputTelemetry {
                power,
                cadence,
                heart_rate,
            }
        }
        OperatingMode::Bridge => {
            let power = if t.real_power == 0 {
                0
            } else {
                t.real_power.saturating_add(t.boost.boost_watts(t.real_power))
            };
            let cadence = if t.real_power == 0 {
                0
            } else if t.real_cadence > 0 {
                t.real_cadence
            } else {
                (ESTIMATED_CADENCE_BASE + t.real_power / 5).min(ESTIMATED_CADENCE_CAP)
            };
            let heart_rate = if t.real_heart_rate != 0 {
                t.real_heart_rate
            } else {
                BRIDGE_HR_BASE + power / 3
            };
            OutputTelemetry {
                power,
                cadence,
                heart_rate,
            }
        }
    };

    out.power = out.power.max(0);
    out.heart_rate = out.heart_rate.min(MAX_HEART_RATE_BPM);
    out
}

/// Bridge tick driver with an injectable noise source.
#[derive(Debug)]
pub struct BridgeEngine<R = StdRng> {
    rng: R,
}

impl BridgeEngine<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> BridgeEngine<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn next_noise(&mut self) -> i32 {
        self.rng.gen_range(NOISE_RANGE)
    }

    /// Derives and stores the outputs in one store transaction. The caller
    /// hands the result to the emitter after the lock is released.
    pub fn tick(&mut self, store: &TelemetryStore) -> OutputTelemetry {
        let noise = self.next_noise();
        store.update(|inner| {
            let out = derive_outputs(&inner.telemetry, noise);
            inner.telemetry.set_outputs(out);
            out
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::BoostConfig;

    fn bridge(real_power: i32, real_cadence: i32, boost: BoostConfig) -> TelemetrySnapshot {
        TelemetrySnapshot {
            mode: OperatingMode::Bridge,
            real_power,
            real_cadence,
            boost,
            ..TelemetrySnapshot::default()
        }
    }

    #[test]
    fn simulation_uses_base_plus_noise() {
        let t = TelemetrySnapshot {
            sim_base_power: 200,
            ..TelemetrySnapshot::default()
        };
        assert_eq!(
            derive_outputs(&t, -3),
            OutputTelemetry {
                power: 197,
                cadence: 89,
                heart_rate: 70 + 197 / 3
            }
        );
    }

    #[test]
    fn simulation_zero_base_falls_back() {
        let t = TelemetrySnapshot {
            sim_base_power: 0,
            ..TelemetrySnapshot::default()
        };
        assert_eq!(derive_outputs(&t, 0).power, 150);
    }

    #[test]
    fn simulation_prefers_connected_hr_sensor() {
        let mut t = TelemetrySnapshot {
            real_heart_rate: 132,
            ..TelemetrySnapshot::default()
        };
        assert_eq!(derive_outputs(&t, 0).heart_rate, 70 + 50);
        t.connected_heart_rate_sensor = true;
        assert_eq!(derive_outputs(&t, 0).heart_rate, 132);
    }

    #[test]
    fn negative_simulation_power_clamps_and_stops_cadence() {
        let t = TelemetrySnapshot {
            sim_base_power: -50,
            ..TelemetrySnapshot::default()
        };
        let out = derive_outputs(&t, 2);
        assert_eq!(out.power, 0);
        assert_eq!(out.cadence, 0);
    }

    #[test]
    fn bridge_boosts() {
        assert_eq!(derive_outputs(&bridge(200, 90, BoostConfig::percent(10)), 0).power, 220);
        assert_eq!(derive_outputs(&bridge(150, 90, BoostConfig::fixed(40)), 0).power, 190);
        assert_eq!(derive_outputs(&bridge(199, 90, BoostConfig::percent(10)), 0).power, 218);
    }

    #[test]
    fn bridge_zero_real_power_zeroes_output() {
        let out = derive_outputs(&bridge(0, 90, BoostConfig::fixed(500)), 3);
        assert_eq!(out.power, 0);
        assert_eq!(out.cadence, 0);
        assert_eq!(out.heart_rate, 65);
    }

    #[test]
    fn bridge_negative_boost_clamps() {
        let out = derive_outputs(&bridge(100, 80, BoostConfig::fixed(-300)), 0);
        assert_eq!(out.power, 0);
        assert_eq!(out.cadence, 80);
    }

    #[test]
    fn bridge_estimates_missing_cadence() {
        assert_eq!(derive_outputs(&bridge(100, 0, BoostConfig::default()), 0).cadence, 80);
        assert_eq!(derive_outputs(&bridge(400, 0, BoostConfig::default()), 0).cadence, 100);
    }

    #[test]
    fn heart_rate_is_capped() {
        let mut t = bridge(200, 90, BoostConfig::default());
        t.real_heart_rate = 230;
        assert_eq!(derive_outputs(&t, 0).heart_rate, 190);
        let big = bridge(900, 90, BoostConfig::default());
        assert_eq!(derive_outputs(&big, 0).heart_rate, 190);
    }

    #[test]
    fn noise_stays_in_range() {
        let mut engine = BridgeEngine::seeded(7);
        for _ in 0..1000 {
            assert!(NOISE_RANGE.contains(&engine.next_noise()));
        }
    }

    #[test]
    fn tick_commits_outputs() {
        let store = TelemetryStore::new();
        let mut engine = BridgeEngine::seeded(1);
        let out = engine.tick(&store);
        assert_eq!(store.telemetry().outputs(), out);
        assert!((147..=153).contains(&out.power));
    }
}
