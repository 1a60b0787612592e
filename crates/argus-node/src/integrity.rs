//! Periodic behavioral classification of every discovered device.
//!
//! Inputs are copied out of the store, scored without the lock, and the
//! resulting reports are committed in one short update.

use std::collections::HashMap;

use argus_core::{Classification, DiscoveredDevice, IntegrityReport, IntegritySignals};
use tracing::debug;

use crate::fingerprint::{evaluate_identity, name_carries_signature, DeviceFingerprint};
use crate::oui::{is_host_adapter_vendor, oui_prefix, vendor_from_mac};
use crate::state::{StoreInner, TelemetryStore};

pub const OBSERVED_PHY: &str = "1M";
pub const OBSERVED_BLE_VERSION: &str = "4.2+";
/// Watts per rpm considered typical for a rider on a trainer.
const DRIFT_BASELINE_RATIO: f64 = 2.9;
/// Notification rate band expected from real trainer firmware.
const TRAINER_HZ_RANGE: (f64, f64) = (0.8, 2.5);

const AWAITING_DATA: &str = "Awaiting additional data to increase confidence.";

#[derive(Debug, Clone)]
pub struct IntegrityConfig {
    /// Name fragment identifying this bridge's own emitted peripheral.
    pub self_signature: String,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            self_signature: "argus".to_string(),
        }
    }
}

/// Mean and population standard deviation. Zeros for an empty slice.
pub fn latency_stats(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Notifications per second across the sampled window.
pub fn notification_rate(timestamps_ms: &[u64]) -> f64 {
    if timestamps_ms.len() < 3 {
        return 0.0;
    }
    let mut sorted = timestamps_ms.to_vec();
    sorted.sort_unstable();
    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return 0.0;
    };
    let span_secs = (last - first) as f64 / 1000.0;
    if span_secs <= 0.0 {
        return 0.0;
    }
    (sorted.len() - 1) as f64 / span_secs
}

pub fn cadence_power_drift(power: i32, cadence: i32) -> f64 {
    if power == 0 || cadence == 0 {
        return 0.0;
    }
    (f64::from(power) / f64::from(cadence) - DRIFT_BASELINE_RATIO).abs() * 20.0
}

pub fn stress_proxy(notify_hz: f64) -> f64 {
    if notify_hz == 0.0 {
        1.0
    } else if notify_hz >= 1.0 {
        0.1
    } else {
        1.0 - notify_hz
    }
}

pub fn mtu_proxy_variance(jitter_ms: f64) -> f64 {
    if jitter_ms == 0.0 {
        0.0
    } else if jitter_ms > 5.0 {
        1.0
    } else {
        jitter_ms / 5.0
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Behavioral signals of the selected trainer, rounded for reporting.
pub fn compute_signals(
    latencies_ms: &[f64],
    timestamps_ms: &[u64],
    real_power: i32,
    real_cadence: i32,
) -> IntegritySignals {
    let (mut mean, mut jitter) = latency_stats(latencies_ms);
    let hz = notification_rate(timestamps_ms);
    let drift = cadence_power_drift(real_power, real_cadence);
    let stress = stress_proxy(hz);
    let mtu = mtu_proxy_variance(jitter);

    if hz > 0.0 && mean == 0.0 {
        mean = (1000.0 / hz) * 0.35;
    }
    if hz > 0.0 && jitter == 0.0 {
        jitter = (mean * 0.08).max(0.9);
    }

    IntegritySignals {
        latency_mean_ms: round2(mean),
        latency_jitter_ms: round2(jitter),
        power_notify_hz: round2(hz),
        power_cadence_drift: round2(drift),
        stress_drop_rate: round2(stress),
        mtu_behavior_variance: round2(mtu),
    }
}

/// Copy of the store state one recompute needs.
#[derive(Debug, Clone, Default)]
pub struct IntegrityInputs {
    pub devices: Vec<DiscoveredDevice>,
    pub latencies_ms: Vec<f64>,
    pub timestamps_ms: Vec<u64>,
    pub real_power: i32,
    pub real_cadence: i32,
    pub trainer_address: Option<String>,
    pub trainer_connected: bool,
    pub local_virtual_address: Option<String>,
}

impl IntegrityInputs {
    pub fn capture(inner: &StoreInner) -> Self {
        let t = &inner.telemetry;
        Self {
            devices: inner.registry.iter().cloned().collect(),
            latencies_ms: t.latencies_ms.iter().copied().collect(),
            timestamps_ms: t.power_timestamps_ms.iter().copied().collect(),
            real_power: t.real_power,
            real_cadence: t.real_cadence,
            trainer_address: t.trainer_address.clone(),
            trainer_connected: t.connected_real_sensor,
            local_virtual_address: t.local_virtual_address.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityEngine {
    config: IntegrityConfig,
}

impl IntegrityEngine {
    pub fn new(config: IntegrityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IntegrityConfig {
        &self.config
    }

    fn is_self(&self, device: &DiscoveredDevice, local_virtual: Option<&str>) -> bool {
        local_virtual == Some(device.address.as_str())
            || name_carries_signature(&device.name, &self.config.self_signature)
    }

    /// Builds one report from captured inputs and precomputed trainer signals.
    pub fn build_report(
        &self,
        device: &DiscoveredDevice,
        inputs: &IntegrityInputs,
        trainer_signals: &IntegritySignals,
        now_ms: u64,
    ) -> IntegrityReport {
        let is_trainer = inputs.trainer_address.as_deref() == Some(device.address.as_str());
        let vendor = vendor_from_mac(&device.address);
        let signals = if is_trainer {
            *trainer_signals
        } else {
            IntegritySignals::idle()
        };

        let mut reasons = Vec::new();
        let mut score: i32 = 70;
        let mut classification = Classification::Suspect;
        let mut confidence = 0.55;

        if self.is_self(device, inputs.local_virtual_address.as_deref()) {
            score = 20;
            classification = Classification::Emulator;
            confidence = 0.95;
            reasons.push(format!("Local emulated device detected ({}).", device.name));
            reasons.push(
                "Host adapter signature detected; not dedicated embedded hardware.".to_string(),
            );
        } else if is_trainer && inputs.trainer_connected && device.has_power_service {
            score = 88;
            classification = Classification::Genuine;
            confidence = 0.86;
            let (low, high) = TRAINER_HZ_RANGE;
            if signals.power_notify_hz < low || signals.power_notify_hz > high {
                score = 74;
                classification = Classification::Suspect;
                confidence = 0.66;
                reasons.push("Notification rate outside the range of a real trainer.".to_string());
            } else {
                reasons.push("Real trainer connected with a coherent notification profile.".to_string());
            }
            if is_host_adapter_vendor(vendor) {
                score -= 8;
                reasons.push(
                    "Host adapter OUI detected; verify no software relay is present.".to_string(),
                );
            }
        } else {
            reasons.push("No active ATT telemetry for a strong classification.".to_string());
        }

        if let Some(hash) = &device.gatt_hash {
            reasons.push(format!("GATT fingerprint {}.", short_hash(hash)));
        }
        if reasons.is_empty() {
            reasons.push(AWAITING_DATA.to_string());
        }

        IntegrityReport {
            target_address: device.address.clone(),
            target_name: device.name.clone(),
            score: score.clamp(0, 100) as u8,
            classification,
            confidence,
            reasons,
            observed_phy: OBSERVED_PHY.to_string(),
            observed_ble_version: OBSERVED_BLE_VERSION.to_string(),
            observed_oui: oui_prefix(&device.address),
            vendor_guess: vendor.to_string(),
            last_updated_ms: now_ms,
            signals,
        }
    }

    /// Scores every device in `inputs`. Pure; no store access.
    pub fn compute_reports(
        &self,
        inputs: &IntegrityInputs,
        now_ms: u64,
    ) -> HashMap<String, IntegrityReport> {
        let trainer_signals = compute_signals(
            &inputs.latencies_ms,
            &inputs.timestamps_ms,
            inputs.real_power,
            inputs.real_cadence,
        );
        inputs
            .devices
            .iter()
            .map(|device| {
                let report = self.build_report(device, inputs, &trainer_signals, now_ms);
                (device.address.clone(), report)
            })
            .collect()
    }

    /// One periodic tick: capture, score, commit.
    pub fn recompute(&self, store: &TelemetryStore, now_ms: u64) {
        let inputs = store.read(IntegrityInputs::capture);
        let reports = self.compute_reports(&inputs, now_ms);
        debug!(devices = reports.len(), "integrity recompute");
        store.update(|inner| {
            let registry = &inner.registry;
            inner.reports.retain(|address, _| registry.contains(address));
            inner.reports.extend(reports);
            refresh_active_report(inner);
        });
    }

    /// Stores the structural verdict for a device whose services were just
    /// discovered. Holds until the next periodic recompute.
    pub fn apply_fingerprint(
        &self,
        store: &TelemetryStore,
        fingerprint: &DeviceFingerprint,
        now_ms: u64,
    ) -> Option<IntegrityReport> {
        let inputs = store.read(IntegrityInputs::capture);
        let device = inputs
            .devices
            .iter()
            .find(|d| d.address == fingerprint.address)?
            .clone();
        let trainer_signals = compute_signals(
            &inputs.latencies_ms,
            &inputs.timestamps_ms,
            inputs.real_power,
            inputs.real_cadence,
        );
        let mut report = self.build_report(&device, &inputs, &trainer_signals, now_ms);
        let verdict = evaluate_identity(fingerprint, &report.signals, &self.config.self_signature);
        report.score = verdict.score;
        report.classification = verdict.classification;
        report.confidence = structural_confidence(verdict.classification);
        report.reasons = verdict.reasons;
        report
            .reasons
            .push(format!("GATT fingerprint {}.", short_hash(&fingerprint.gatt_hash)));

        store.update(|inner| {
            inner.reports.insert(device.address.clone(), report.clone());
            refresh_active_report(inner);
        });
        Some(report)
    }
}

fn structural_confidence(classification: Classification) -> f64 {
    match classification {
        Classification::Genuine => 0.8,
        Classification::Suspect => 0.6,
        Classification::Emulator => 0.9,
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

/// Trainer's report, else the earliest discovered device's, else none.
pub fn refresh_active_report(inner: &mut StoreInner) {
    let trainer = inner
        .telemetry
        .trainer_address
        .as_ref()
        .and_then(|addr| inner.reports.get(addr));
    let active = trainer.or_else(|| {
        inner
            .registry
            .first_by_order()
            .and_then(|d| inner.reports.get(&d.address))
    });
    inner.active_report = active.cloned();
}
