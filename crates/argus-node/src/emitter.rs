//! Local virtual peripheral: provisioning and per-tick notifications.

use std::sync::Arc;

use argus_core::{GattService, OutputTelemetry, LOCAL_VIRTUAL_PLACEHOLDER, MAX_HEART_RATE_BPM};
use argus_gatt::uuids::{
    sig_uuid, APPEARANCE_CYCLING_POWER_SENSOR, CHAR_APPEARANCE, CHAR_CSC_MEASUREMENT,
    CHAR_CYCLING_POWER_FEATURE, CHAR_CYCLING_POWER_MEASUREMENT, CHAR_HEART_RATE_MEASUREMENT,
    SERVICE_CYCLING_POWER, SERVICE_CYCLING_SPEED_AND_CADENCE, SERVICE_GENERIC_ACCESS,
    SERVICE_HEART_RATE,
};
use argus_gatt::{encode_heart_rate, encode_power_measurement, CrankEncoder};
use argus_transport_ble::{Advertisement, LinkError, PeripheralLink};
use thiserror::Error;
use tracing::info;

use crate::state::TelemetryStore;

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("peripheral link error: {0}")]
    Link(#[from] LinkError),
}

/// Service table exposed by the emitted peripheral.
pub fn local_services() -> Vec<GattService> {
    vec![
        GattService::new(sig_uuid(SERVICE_GENERIC_ACCESS))
            .with_characteristic(sig_uuid(CHAR_APPEARANCE), "read"),
        GattService::new(sig_uuid(SERVICE_CYCLING_POWER))
            .with_characteristic(sig_uuid(CHAR_CYCLING_POWER_MEASUREMENT), "notify,read")
            .with_characteristic(sig_uuid(CHAR_CYCLING_POWER_FEATURE), "read"),
        GattService::new(sig_uuid(SERVICE_CYCLING_SPEED_AND_CADENCE))
            .with_characteristic(sig_uuid(CHAR_CSC_MEASUREMENT), "notify"),
        GattService::new(sig_uuid(SERVICE_HEART_RATE))
            .with_characteristic(sig_uuid(CHAR_HEART_RATE_MEASUREMENT), "notify"),
    ]
}

pub struct VirtualPeripheral {
    link: Arc<dyn PeripheralLink>,
    local_name: String,
    crank: CrankEncoder,
    power_uuid: String,
    csc_uuid: String,
    hr_uuid: String,
}

impl std::fmt::Debug for VirtualPeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualPeripheral")
            .field("local_name", &self.local_name)
            .field("crank", &self.crank)
            .finish_non_exhaustive()
    }
}

impl VirtualPeripheral {
    pub fn new(link: Arc<dyn PeripheralLink>, local_name: impl Into<String>) -> Self {
        Self {
            link,
            local_name: local_name.into(),
            crank: CrankEncoder::new(),
            power_uuid: sig_uuid(CHAR_CYCLING_POWER_MEASUREMENT),
            csc_uuid: sig_uuid(CHAR_CSC_MEASUREMENT),
            hr_uuid: sig_uuid(CHAR_HEART_RATE_MEASUREMENT),
        }
    }

    /// Adds the services, starts advertising and registers the local
    /// device. Returns the registry address used for it.
    pub fn provision(&self, store: &TelemetryStore, now_ms: u64) -> Result<String, EmitError> {
        for service in local_services() {
            self.link.add_service(&service)?;
        }
        self.link.write_characteristic(
            &sig_uuid(CHAR_APPEARANCE),
            &APPEARANCE_CYCLING_POWER_SENSOR.to_le_bytes(),
        )?;
        self.link
            .write_characteristic(&sig_uuid(CHAR_CYCLING_POWER_FEATURE), &[0, 0, 0, 0])?;
        self.link.advertise(&Advertisement {
            local_name: self.local_name.clone(),
            service_uuids: vec![sig_uuid(SERVICE_CYCLING_POWER)],
            appearance: APPEARANCE_CYCLING_POWER_SENSOR,
        })?;

        let address = self
            .link
            .local_address()
            .unwrap_or_else(|| LOCAL_VIRTUAL_PLACEHOLDER.to_string());
        store.update(|inner| {
            inner
                .registry
                .register_local_virtual(&address, &self.local_name, now_ms);
            inner.telemetry.local_virtual_address = Some(address.clone());
        });
        info!(address = %address, name = %self.local_name, "virtual peripheral advertising");
        Ok(address)
    }

    /// Writes one tick of outputs to the three notify characteristics.
    pub fn emit(&mut self, out: OutputTelemetry) -> Result<(), EmitError> {
        self.link
            .write_characteristic(&self.power_uuid, &encode_power_measurement(out.power))?;
        let csc = self.crank.next_frame(out.cadence);
        self.link.write_characteristic(&self.csc_uuid, &csc)?;
        let hr = encode_heart_rate(out.heart_rate.min(MAX_HEART_RATE_BPM));
        self.link.write_characteristic(&self.hr_uuid, &hr)?;
        Ok(())
    }
}
