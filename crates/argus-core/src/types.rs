use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArgusError;

/// Maximum number of rolling samples kept per sample buffer.
pub const ROLLING_SAMPLE_CAP: usize = 80;
/// Hardware-safety ceiling for emitted heart rate.
pub const MAX_HEART_RATE_BPM: i32 = 190;
/// Registry key used for the local peripheral before the adapter address is known.
pub const LOCAL_VIRTUAL_PLACEHOLDER: &str = "LOCAL-VIRTUAL";

/// Derivation path run by the bridge engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingMode {
    #[default]
    #[serde(rename = "sim")]
    Simulation,
    #[serde(rename = "bridge")]
    Bridge,
}

impl OperatingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OperatingMode::Simulation => "sim",
            OperatingMode::Bridge => "bridge",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = ArgusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sim" | "simulation" => Ok(OperatingMode::Simulation),
            "bridge" => Ok(OperatingMode::Bridge),
            other => Err(ArgusError::UnknownVariant {
                kind: "mode",
                value: other.to_string(),
            }),
        }
    }
}

/// How the operator boost is applied to real power.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoostKind {
    #[default]
    #[serde(rename = "fix")]
    Fixed,
    #[serde(rename = "pct")]
    Percent,
}

impl BoostKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BoostKind::Fixed => "fix",
            BoostKind::Percent => "pct",
        }
    }
}

impl FromStr for BoostKind {
    type Err = ArgusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fix" | "fixed" => Ok(BoostKind::Fixed),
            "pct" | "percent" => Ok(BoostKind::Percent),
            other => Err(ArgusError::UnknownVariant {
                kind: "boost type",
                value: other.to_string(),
            }),
        }
    }
}

/// Operator-configured adjustment applied to real power in bridge mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoostConfig {
    pub kind: BoostKind,
    pub value: i32,
}

impl BoostConfig {
    pub fn fixed(value: i32) -> Self {
        Self {
            kind: BoostKind::Fixed,
            value,
        }
    }

    pub fn percent(value: i32) -> Self {
        Self {
            kind: BoostKind::Percent,
            value,
        }
    }

    /// Extra watts for `real_power`. Percent boosts truncate toward zero.
    pub fn boost_watts(&self, real_power: i32) -> i32 {
        match self.kind {
            BoostKind::Fixed => self.value,
            BoostKind::Percent => {
                let scaled = i64::from(real_power) * i64::from(self.value) / 100;
                scaled.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
            }
        }
    }
}

/// Output triple produced by one bridge tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTelemetry {
    pub power: i32,
    pub cadence: i32,
    pub heart_rate: i32,
}

/// One peripheral seen by the scanner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub address: String,
    pub name: String,
    pub rssi: i16,
    pub has_power_service: bool,
    pub has_heart_rate_service: bool,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    /// Exponentially smoothed advertising interval.
    pub observed_adv_interval_ms: Option<u64>,
    /// Monotonic insertion counter, starts at 1.
    pub order: u64,
    /// Hex-encoded manufacturer specific data.
    pub manufacturer_data: Option<String>,
    /// Structural fingerprint, set once services are discovered.
    pub gatt_hash: Option<String>,
}

/// Integrity verdict for a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    #[serde(rename = "genuine")]
    Genuine,
    #[default]
    #[serde(rename = "suspect")]
    Suspect,
    #[serde(rename = "emulator")]
    Emulator,
}

/// Behavioral statistics attached to a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegritySignals {
    pub latency_mean_ms: f64,
    pub latency_jitter_ms: f64,
    pub power_notify_hz: f64,
    pub power_cadence_drift: f64,
    pub stress_drop_rate: f64,
    pub mtu_behavior_variance: f64,
}

impl IntegritySignals {
    /// Signals for a device with no observed telemetry.
    pub fn idle() -> Self {
        Self {
            stress_drop_rate: 1.0,
            ..Self::default()
        }
    }
}

/// Classification report for one discovered device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub target_address: String,
    pub target_name: String,
    pub score: u8,
    pub classification: Classification,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub observed_phy: String,
    pub observed_ble_version: String,
    pub observed_oui: String,
    pub vendor_guess: String,
    pub last_updated_ms: u64,
    pub signals: IntegritySignals,
}

/// One characteristic in a discovered GATT tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GattCharacteristic {
    pub uuid: String,
    /// Property names as reported by the stack, e.g. `"notify,read"`.
    pub properties: String,
}

/// One service in a discovered GATT tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GattService {
    pub uuid: String,
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, uuid: impl Into<String>, properties: impl Into<String>) -> Self {
        self.characteristics.push(GattCharacteristic {
            uuid: uuid.into(),
            properties: properties.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_boost_truncates_toward_zero() {
        assert_eq!(BoostConfig::percent(10).boost_watts(200), 20);
        assert_eq!(BoostConfig::percent(10).boost_watts(199), 19);
        assert_eq!(BoostConfig::percent(-10).boost_watts(199), -19);
    }

    #[test]
    fn fixed_boost_ignores_real_power() {
        assert_eq!(BoostConfig::fixed(40).boost_watts(150), 40);
        assert_eq!(BoostConfig::fixed(40).boost_watts(0), 40);
    }

    #[test]
    fn mode_and_boost_parse_wire_names() {
        assert_eq!("sim".parse::<OperatingMode>().unwrap(), OperatingMode::Simulation);
        assert_eq!("Bridge".parse::<OperatingMode>().unwrap(), OperatingMode::Bridge);
        assert!("turbo".parse::<OperatingMode>().is_err());
        assert_eq!("pct".parse::<BoostKind>().unwrap(), BoostKind::Percent);
        assert_eq!("fix".parse::<BoostKind>().unwrap(), BoostKind::Fixed);
    }

    #[test]
    fn serde_uses_wire_names() {
        assert_eq!(
            serde_json::to_string(&OperatingMode::Bridge).unwrap(),
            "\"bridge\""
        );
        assert_eq!(serde_json::to_string(&BoostKind::Percent).unwrap(), "\"pct\"");
        assert_eq!(
            serde_json::to_string(&Classification::Emulator).unwrap(),
            "\"emulator\""
        );
    }

    #[test]
    fn idle_signals_report_full_drop_rate() {
        let idle = IntegritySignals::idle();
        assert_eq!(idle.stress_drop_rate, 1.0);
        assert_eq!(idle.power_notify_hz, 0.0);
    }
}
