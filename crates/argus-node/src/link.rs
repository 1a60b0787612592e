//! Sensor link manager: turns radio events into registry and telemetry
//! updates, and drives trainer / heart-rate auto-connect.

use std::sync::Arc;

use argus_core::{GattService, OperatingMode};
use argus_gatt::uuids::{short_from_uuid, CHAR_CYCLING_POWER_MEASUREMENT, CHAR_HEART_RATE_MEASUREMENT};
use argus_gatt::{decode_heart_rate_measurement, decode_power_measurement, CrankDecoder};
use argus_transport_ble::{CentralLink, LinkError, RadioEvent, Sighting};
use tracing::{debug, info, warn};

use crate::command::{apply_setting, Command};
use crate::fingerprint::{compute_gatt_hash, name_carries_signature, DeviceFingerprint};
use crate::integrity::IntegrityEngine;
use crate::state::TelemetryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorRole {
    Trainer,
    HeartRate,
}

/// Cloneable handle for operations other tasks need: connect requests,
/// scanning and the operator disconnect.
#[derive(Clone)]
pub struct LinkControl {
    store: TelemetryStore,
    central: Arc<dyn CentralLink>,
}

impl std::fmt::Debug for LinkControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkControl").finish_non_exhaustive()
    }
}

impl LinkControl {
    pub fn new(store: TelemetryStore, central: Arc<dyn CentralLink>) -> Self {
        Self { store, central }
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub fn start_scan(&self) -> Result<(), LinkError> {
        self.central.start_scan()
    }

    pub fn stop_scan(&self) -> Result<(), LinkError> {
        self.central.stop_scan()
    }

    /// Issues a connect unless one is already linked or in flight for the
    /// address. Returns whether a connect was issued.
    pub fn request_connect(&self, address: &str, role: SensorRole) -> bool {
        let claimed = self.store.update(|inner| {
            let t = &mut inner.telemetry;
            if t.is_linked_or_connecting(address) {
                return false;
            }
            t.connecting.insert(address.to_string());
            match role {
                SensorRole::Trainer => t.trainer_address = Some(address.to_string()),
                SensorRole::HeartRate => t.heart_rate_address = Some(address.to_string()),
            }
            true
        });
        if !claimed {
            return false;
        }

        if role == SensorRole::Trainer {
            if let Err(err) = self.central.stop_scan() {
                debug!(%err, "stop scan before connect failed");
            }
        }
        info!(address = %address, ?role, "connecting");
        if let Err(err) = self.central.connect(address) {
            warn!(address = %address, %err, "connect request failed");
            self.release(address);
            return false;
        }
        true
    }

    /// Drops a pending connect claim after a failure.
    fn release(&self, address: &str) {
        self.store.update(|inner| {
            let t = &mut inner.telemetry;
            t.connecting.remove(address);
            if !t.connected_real_sensor && t.trainer_address.as_deref() == Some(address) {
                t.trainer_address = None;
            }
            if !t.connected_heart_rate_sensor && t.heart_rate_address.as_deref() == Some(address) {
                t.heart_rate_address = None;
            }
        });
    }

    /// Operator disconnect: clears trainer state and returns to simulation
    /// before the radio is asked to drop the link. The heart-rate sensor
    /// stays connected.
    pub fn disconnect_trainer(&self) -> Result<(), LinkError> {
        let address = self.store.update(|inner| {
            let t = &mut inner.telemetry;
            t.connected_real_sensor = false;
            t.real_power = 0;
            t.real_cadence = 0;
            t.mode = OperatingMode::Simulation;
            let address = t.trainer_address.take();
            if let Some(addr) = &address {
                t.connecting.remove(addr);
            }
            address
        });
        info!("trainer released, back to simulation");
        match address {
            Some(addr) => self.central.disconnect(&addr),
            None => Ok(()),
        }
    }

    /// Applies operator commands in order.
    pub fn apply(&self, commands: &[Command]) -> Result<(), LinkError> {
        let mut disconnect = false;
        self.store.update(|inner| {
            for command in commands {
                if !apply_setting(&mut inner.telemetry, *command) {
                    disconnect = true;
                }
            }
        });
        if disconnect {
            self.disconnect_trainer()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Name the local peripheral advertises; never auto-connected.
    pub local_name: String,
    pub self_signature: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            local_name: "Argus X-Link".to_string(),
            self_signature: "argus".to_string(),
        }
    }
}

/// Owned by the event pump. Holds the decode-side crank state.
#[derive(Debug)]
pub struct SensorLinkManager {
    control: LinkControl,
    integrity: IntegrityEngine,
    config: LinkConfig,
    power_crank: CrankDecoder,
}

impl SensorLinkManager {
    pub fn new(control: LinkControl, integrity: IntegrityEngine, config: LinkConfig) -> Self {
        Self {
            control,
            integrity,
            config,
            power_crank: CrankDecoder::new(),
        }
    }

    pub fn control(&self) -> &LinkControl {
        &self.control
    }

    pub fn handle_event(&mut self, event: RadioEvent, now_ms: u64) {
        match event {
            RadioEvent::Sighting(sighting) => self.on_sighting(&sighting, now_ms),
            RadioEvent::Connected { address, services } => {
                self.on_connected(&address, services, now_ms)
            }
            RadioEvent::ConnectFailed { address, reason } => {
                warn!(address = %address, reason = %reason, "connect failed");
                self.control.release(&address);
            }
            RadioEvent::Disconnected { address } => self.on_disconnected(&address),
            RadioEvent::Notification {
                address,
                characteristic,
                value,
                received_at_ms,
            } => self.on_notification(&address, &characteristic, &value, received_at_ms, now_ms),
            RadioEvent::ClientLink { connected } => {
                let was = self.control.store.update(|inner| {
                    std::mem::replace(&mut inner.telemetry.client_connected, connected)
                });
                if connected {
                    info!("client linked to virtual peripheral");
                } else if was {
                    info!("client left virtual peripheral");
                }
            }
        }
    }

    fn is_self(&self, sighting: &Sighting, local_virtual: Option<&str>) -> bool {
        local_virtual == Some(sighting.address.as_str())
            || sighting.name == self.config.local_name
            || name_carries_signature(&sighting.name, &self.config.self_signature)
    }

    fn on_sighting(&mut self, sighting: &Sighting, now_ms: u64) {
        let (wants_trainer, wants_hr) = self.control.store.update(|inner| {
            inner.registry.register_sighting(sighting, now_ms);
            let t = &inner.telemetry;
            if self.is_self(sighting, t.local_virtual_address.as_deref()) {
                return (false, false);
            }
            let trainer_busy = t.connected_real_sensor
                || t
                    .trainer_address
                    .as_ref()
                    .is_some_and(|a| t.connecting.contains(a));
            let hr_busy = t.connected_heart_rate_sensor
                || t
                    .heart_rate_address
                    .as_ref()
                    .is_some_and(|a| t.connecting.contains(a));
            let wants_trainer = t.mode == OperatingMode::Bridge
                && !trainer_busy
                && sighting.advertises_power()
                && !sighting.name.is_empty();
            let wants_hr = !hr_busy && sighting.advertises_heart_rate();
            (wants_trainer, wants_hr)
        });

        if wants_trainer {
            self.control.request_connect(&sighting.address, SensorRole::Trainer);
        } else if wants_hr {
            self.control.request_connect(&sighting.address, SensorRole::HeartRate);
        }
    }

    fn on_connected(&mut self, address: &str, services: Vec<GattService>, now_ms: u64) {
        let gatt_hash = compute_gatt_hash(&services);
        let (is_trainer, fingerprint) = self.control.store.update(|inner| {
            let t = &mut inner.telemetry;
            t.connecting.remove(address);
            let is_trainer = t.trainer_address.as_deref() == Some(address);
            if is_trainer {
                t.connected_real_sensor = true;
            }
            if t.heart_rate_address.as_deref() == Some(address) {
                t.connected_heart_rate_sensor = true;
            }
            inner.registry.set_gatt_hash(address, gatt_hash.clone());
            let fingerprint = inner.registry.get(address).map(|d| {
                DeviceFingerprint::new(
                    address,
                    d.name.clone(),
                    d.manufacturer_data.clone(),
                    services,
                )
            });
            (is_trainer, fingerprint)
        });
        // Only a new trainer session invalidates the crank reference.
        if is_trainer {
            self.power_crank.reset();
        }
        info!(address = %address, gatt_hash = %gatt_hash, "sensor linked");

        if let Some(fp) = fingerprint {
            if let Some(report) = self.integrity.apply_fingerprint(&self.control.store, &fp, now_ms) {
                debug!(
                    address = %address,
                    score = report.score,
                    classification = ?report.classification,
                    "structural verdict"
                );
            }
        }
    }

    fn on_disconnected(&mut self, address: &str) {
        let role = self.control.store.update(|inner| {
            let t = &mut inner.telemetry;
            t.connecting.remove(address);
            let mut role = None;
            if t.trainer_address.as_deref() == Some(address) {
                t.connected_real_sensor = false;
                t.real_power = 0;
                t.real_cadence = 0;
                t.trainer_address = None;
                role = Some(SensorRole::Trainer);
            }
            if t.heart_rate_address.as_deref() == Some(address) {
                t.connected_heart_rate_sensor = false;
                t.real_heart_rate = 0;
                t.heart_rate_address = None;
                role = role.or(Some(SensorRole::HeartRate));
            }
            role
        });
        if let Some(role) = role {
            warn!(address = %address, ?role, "sensor link lost");
        }
    }

    fn on_notification(
        &mut self,
        address: &str,
        characteristic: &str,
        value: &[u8],
        received_at_ms: u64,
        now_ms: u64,
    ) {
        match short_from_uuid(characteristic) {
            Some(CHAR_CYCLING_POWER_MEASUREMENT) => {
                let m = decode_power_measurement(value, &mut self.power_crank);
                let latency = now_ms.saturating_sub(received_at_ms) as f64;
                self.control.store.update(|inner| {
                    let t = &mut inner.telemetry;
                    if t.trainer_address.as_deref() != Some(address) {
                        return;
                    }
                    t.real_power = m.power;
                    t.real_cadence = m.cadence_rpm;
                    t.record_power_sample(now_ms, Some(latency));
                });
            }
            Some(CHAR_HEART_RATE_MEASUREMENT) => {
                let bpm = decode_heart_rate_measurement(value);
                self.control
                    .store
                    .update(|inner| inner.telemetry.real_heart_rate = i32::from(bpm));
            }
            _ => debug!(address = %address, characteristic = %characteristic, "ignored notification"),
        }
    }
}
