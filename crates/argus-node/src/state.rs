use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use argus_core::{
    BoostConfig, IntegrityReport, OperatingMode, OutputTelemetry, ROLLING_SAMPLE_CAP,
};
use serde::Serialize;

use crate::registry::DeviceRegistry;

/// Simulation base power used when none is configured.
pub const DEFAULT_SIM_BASE_POWER: i32 = 150;

/// Live telemetry record shared by every task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// Last power reported by the trainer. 0 means unknown.
    pub real_power: i32,
    pub real_cadence: i32,
    pub real_heart_rate: i32,
    pub output_power: i32,
    pub output_cadence: i32,
    pub output_heart_rate: i32,
    pub connected_real_sensor: bool,
    pub connected_heart_rate_sensor: bool,
    /// A client is linked to the emitted peripheral.
    pub client_connected: bool,
    pub sim_base_power: i32,
    pub mode: OperatingMode,
    pub boost: BoostConfig,
    /// Arrival times of recent power notifications.
    pub power_timestamps_ms: VecDeque<u64>,
    /// Delivery latency of recent notifications.
    pub latencies_ms: VecDeque<f64>,
    pub trainer_address: Option<String>,
    pub heart_rate_address: Option<String>,
    pub local_virtual_address: Option<String>,
    /// Addresses with a connect attempt in flight.
    pub connecting: HashSet<String>,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            real_power: 0,
            real_cadence: 0,
            real_heart_rate: 0,
            output_power: 0,
            output_cadence: 0,
            output_heart_rate: 0,
            connected_real_sensor: false,
            connected_heart_rate_sensor: false,
            client_connected: false,
            sim_base_power: DEFAULT_SIM_BASE_POWER,
            mode: OperatingMode::default(),
            boost: BoostConfig::default(),
            power_timestamps_ms: VecDeque::with_capacity(ROLLING_SAMPLE_CAP),
            latencies_ms: VecDeque::with_capacity(ROLLING_SAMPLE_CAP),
            trainer_address: None,
            heart_rate_address: None,
            local_virtual_address: None,
            connecting: HashSet::new(),
        }
    }
}

fn push_capped<T>(buf: &mut VecDeque<T>, value: T) {
    if buf.len() == ROLLING_SAMPLE_CAP {
        buf.pop_front();
    }
    buf.push_back(value);
}

impl TelemetrySnapshot {
    /// Records one power notification; both buffers keep the newest samples.
    pub fn record_power_sample(&mut self, at_ms: u64, latency_ms: Option<f64>) {
        push_capped(&mut self.power_timestamps_ms, at_ms);
        if let Some(latency) = latency_ms {
            push_capped(&mut self.latencies_ms, latency);
        }
    }

    pub fn outputs(&self) -> OutputTelemetry {
        OutputTelemetry {
            power: self.output_power,
            cadence: self.output_cadence,
            heart_rate: self.output_heart_rate,
        }
    }

    pub fn set_outputs(&mut self, out: OutputTelemetry) {
        self.output_power = out.power;
        self.output_cadence = out.cadence;
        self.output_heart_rate = out.heart_rate;
    }

    /// True if `address` is already connected or has a connect in flight.
    pub fn is_linked_or_connecting(&self, address: &str) -> bool {
        self.connecting.contains(address)
            || (self.connected_real_sensor && self.trainer_address.as_deref() == Some(address))
            || (self.connected_heart_rate_sensor
                && self.heart_rate_address.as_deref() == Some(address))
    }
}

/// Everything guarded by the store lock.
#[derive(Debug, Clone, Default)]
pub struct StoreInner {
    pub telemetry: TelemetrySnapshot,
    pub registry: DeviceRegistry,
    pub reports: HashMap<String, IntegrityReport>,
    pub active_report: Option<IntegrityReport>,
}

/// Cloneable handle to the shared state.
#[derive(Debug, Clone, Default)]
pub struct TelemetryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_telemetry(telemetry: TelemetrySnapshot) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                telemetry,
                ..StoreInner::default()
            })),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&StoreInner) -> R) -> R {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut StoreInner) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn snapshot(&self) -> StoreInner {
        self.read(StoreInner::clone)
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.read(|inner| inner.telemetry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_power_up_state() {
        let t = TelemetrySnapshot::default();
        assert_eq!(t.sim_base_power, 150);
        assert_eq!(t.mode, OperatingMode::Simulation);
        assert_eq!(t.boost, BoostConfig::fixed(0));
        assert!(!t.connected_real_sensor);
        assert!(t.power_timestamps_ms.is_empty());
    }

    #[test]
    fn rolling_buffers_are_capped() {
        let mut t = TelemetrySnapshot::default();
        for i in 0..200u64 {
            t.record_power_sample(i, if i % 2 == 0 { Some(i as f64) } else { None });
        }
        assert_eq!(t.power_timestamps_ms.len(), ROLLING_SAMPLE_CAP);
        assert_eq!(t.power_timestamps_ms.front(), Some(&120));
        assert_eq!(t.power_timestamps_ms.back(), Some(&199));
        assert_eq!(t.latencies_ms.len(), ROLLING_SAMPLE_CAP);
        assert_eq!(t.latencies_ms.back(), Some(&198.0));
    }

    #[test]
    fn store_updates_are_visible_through_clones() {
        let store = TelemetryStore::new();
        let other = store.clone();
        other.update(|inner| inner.telemetry.real_power = 210);
        assert_eq!(store.read(|inner| inner.telemetry.real_power), 210);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let store = TelemetryStore::new();
        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            poisoner.update(|inner| {
                inner.telemetry.real_power = 99;
                panic!("poison");
            })
        })
        .join();
        assert_eq!(store.telemetry().real_power, 99);
        store.update(|inner| inner.telemetry.real_power = 100);
        assert_eq!(store.telemetry().real_power, 100);
    }

    #[test]
    fn linked_or_connecting_guard() {
        let mut t = TelemetrySnapshot::default();
        assert!(!t.is_linked_or_connecting("aa"));
        t.connecting.insert("aa".into());
        assert!(t.is_linked_or_connecting("aa"));
        t.connecting.clear();
        t.trainer_address = Some("aa".into());
        assert!(!t.is_linked_or_connecting("aa"));
        t.connected_real_sensor = true;
        assert!(t.is_linked_or_connecting("aa"));
    }
}
