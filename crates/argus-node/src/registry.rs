use std::collections::HashMap;

use argus_core::{DiscoveredDevice, LOCAL_VIRTUAL_PLACEHOLDER};
use argus_transport_ble::Sighting;
use serde::Serialize;

/// Advertising interval assumed for the local peripheral.
pub const LOCAL_VIRTUAL_ADV_INTERVAL_MS: u64 = 1000;

/// Every peripheral seen since start-up, keyed by address.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRegistry {
    devices: HashMap<String, DiscoveredDevice>,
    next_order: u64,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self {
            devices: HashMap::new(),
            next_order: 1,
        }
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_order(&mut self) -> u64 {
        let order = self.next_order;
        self.next_order += 1;
        order
    }

    /// Creates or merges the entry for `sighting`.
    pub fn register_sighting(&mut self, sighting: &Sighting, now_ms: u64) -> &DiscoveredDevice {
        if !self.devices.contains_key(&sighting.address) {
            let order = self.take_order();
            self.devices.insert(
                sighting.address.clone(),
                DiscoveredDevice {
                    address: sighting.address.clone(),
                    name: sighting.name.clone(),
                    rssi: sighting.rssi,
                    has_power_service: sighting.advertises_power(),
                    has_heart_rate_service: sighting.advertises_heart_rate(),
                    first_seen_ms: now_ms,
                    last_seen_ms: now_ms,
                    observed_adv_interval_ms: None,
                    order,
                    manufacturer_data: sighting.manufacturer_hex(),
                    gatt_hash: None,
                },
            );
        } else if let Some(device) = self.devices.get_mut(&sighting.address) {
            let interval = now_ms.saturating_sub(device.last_seen_ms);
            device.observed_adv_interval_ms = Some(match device.observed_adv_interval_ms {
                None => interval,
                Some(avg) => (interval + avg) / 2,
            });
            device.last_seen_ms = now_ms;
            device.rssi = sighting.rssi;
            if !sighting.name.is_empty() {
                device.name = sighting.name.clone();
            }
            device.has_power_service |= sighting.advertises_power();
            device.has_heart_rate_service |= sighting.advertises_heart_rate();
            if let Some(data) = sighting.manufacturer_hex() {
                device.manufacturer_data = Some(data);
            }
        }
        &self.devices[&sighting.address]
    }

    /// Provisions the entry describing the emitted peripheral. Keeps the
    /// order of an earlier entry for the same address or the placeholder.
    pub fn register_local_virtual(&mut self, address: &str, name: &str, now_ms: u64) -> &DiscoveredDevice {
        let placeholder = if address != LOCAL_VIRTUAL_PLACEHOLDER {
            self.devices.remove(LOCAL_VIRTUAL_PLACEHOLDER)
        } else {
            None
        };
        let previous = self.devices.remove(address).or(placeholder);
        let order = match previous {
            Some(prev) => prev.order,
            None => self.take_order(),
        };
        self.devices.insert(
            address.to_string(),
            DiscoveredDevice {
                address: address.to_string(),
                name: name.to_string(),
                rssi: 0,
                has_power_service: true,
                has_heart_rate_service: true,
                first_seen_ms: now_ms,
                last_seen_ms: now_ms,
                observed_adv_interval_ms: Some(LOCAL_VIRTUAL_ADV_INTERVAL_MS),
                order,
                manufacturer_data: None,
                gatt_hash: None,
            },
        );
        &self.devices[address]
    }

    /// Returns false if the address is unknown.
    pub fn set_gatt_hash(&mut self, address: &str, hash: String) -> bool {
        match self.devices.get_mut(address) {
            Some(device) => {
                device.gatt_hash = Some(hash);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, address: &str) -> Option<&DiscoveredDevice> {
        self.devices.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.devices.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveredDevice> {
        self.devices.values()
    }

    /// Devices in first-seen order.
    pub fn ordered(&self) -> Vec<&DiscoveredDevice> {
        let mut devices: Vec<_> = self.devices.values().collect();
        devices.sort_by_key(|d| d.order);
        devices
    }

    pub fn first_by_order(&self) -> Option<&DiscoveredDevice> {
        self.devices.values().min_by_key(|d| d.order)
    }
}
