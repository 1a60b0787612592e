use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use argus_core::GattService;

use crate::{Advertisement, CentralLink, LinkError, PeripheralLink};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Recorded central operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralCall {
    StartScan,
    StopScan,
    Connect(String),
    Disconnect(String),
}

/// Central that records calls instead of touching a radio.
#[derive(Debug, Default)]
pub struct MockCentral {
    calls: Mutex<Vec<CentralCall>>,
    fail_connect: Mutex<Option<LinkError>>,
}

impl MockCentral {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `connect` call fail with `err`.
    pub fn fail_next_connect(&self, err: LinkError) {
        *lock(&self.fail_connect) = Some(err);
    }

    pub fn calls(&self) -> Vec<CentralCall> {
        lock(&self.calls).clone()
    }

    pub fn take_calls(&self) -> Vec<CentralCall> {
        std::mem::take(&mut *lock(&self.calls))
    }

    fn record(&self, call: CentralCall) {
        lock(&self.calls).push(call);
    }
}

impl CentralLink for MockCentral {
    fn start_scan(&self) -> Result<(), LinkError> {
        self.record(CentralCall::StartScan);
        Ok(())
    }

    fn stop_scan(&self) -> Result<(), LinkError> {
        self.record(CentralCall::StopScan);
        Ok(())
    }

    fn connect(&self, address: &str) -> Result<(), LinkError> {
        self.record(CentralCall::Connect(address.to_string()));
        match lock(&self.fail_connect).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn disconnect(&self, address: &str) -> Result<(), LinkError> {
        self.record(CentralCall::Disconnect(address.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PeripheralTable {
    services: Vec<GattService>,
    advertisement: Option<Advertisement>,
    values: HashMap<String, Vec<u8>>,
    writes: u64,
}

/// In-memory GATT server. Stores the latest value per characteristic.
#[derive(Debug, Default)]
pub struct MockPeripheral {
    table: Mutex<PeripheralTable>,
    address: Option<String>,
}

impl MockPeripheral {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    pub fn services(&self) -> Vec<GattService> {
        lock(&self.table).services.clone()
    }

    pub fn advertisement(&self) -> Option<Advertisement> {
        lock(&self.table).advertisement.clone()
    }

    pub fn value(&self, uuid: &str) -> Option<Vec<u8>> {
        lock(&self.table).values.get(&uuid.to_ascii_lowercase()).cloned()
    }

    pub fn write_count(&self) -> u64 {
        lock(&self.table).writes
    }
}

impl PeripheralLink for MockPeripheral {
    fn add_service(&self, service: &GattService) -> Result<(), LinkError> {
        let mut table = lock(&self.table);
        table.services.retain(|s| !s.uuid.eq_ignore_ascii_case(&service.uuid));
        table.services.push(service.clone());
        Ok(())
    }

    fn advertise(&self, advertisement: &Advertisement) -> Result<(), LinkError> {
        lock(&self.table).advertisement = Some(advertisement.clone());
        Ok(())
    }

    fn write_characteristic(&self, uuid: &str, value: &[u8]) -> Result<(), LinkError> {
        let mut table = lock(&self.table);
        let known = table
            .services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .any(|c| c.uuid.eq_ignore_ascii_case(uuid));
        if !known {
            return Err(LinkError::UnknownCharacteristic(uuid.to_string()));
        }
        table.values.insert(uuid.to_ascii_lowercase(), value.to_vec());
        table.writes += 1;
        Ok(())
    }

    fn local_address(&self) -> Option<String> {
        self.address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn central_records_calls_in_order() {
        let central = MockCentral::new();
        central.start_scan().unwrap();
        central.connect("aa:bb").unwrap();
        central.stop_scan().unwrap();
        assert_eq!(
            central.take_calls(),
            vec![
                CentralCall::StartScan,
                CentralCall::Connect("aa:bb".into()),
                CentralCall::StopScan
            ]
        );
        assert!(central.calls().is_empty());
    }

    #[test]
    fn scripted_connect_failure_is_one_shot() {
        let central = MockCentral::new();
        central.fail_next_connect(LinkError::AdapterUnavailable);
        assert_eq!(central.connect("aa:bb"), Err(LinkError::AdapterUnavailable));
        assert_eq!(central.connect("aa:bb"), Ok(()));
    }

    #[test]
    fn peripheral_rejects_unknown_characteristic() {
        let peripheral = MockPeripheral::new();
        peripheral
            .add_service(&GattService::new("1818").with_characteristic("2A63", "notify,read"))
            .unwrap();
        peripheral.write_characteristic("2a63", &[0, 0, 100, 0]).unwrap();
        assert_eq!(peripheral.value("2A63"), Some(vec![0, 0, 100, 0]));
        assert_eq!(
            peripheral.write_characteristic("2a37", &[0, 60]),
            Err(LinkError::UnknownCharacteristic("2a37".into()))
        );
        assert_eq!(peripheral.write_count(), 1);
    }
}
