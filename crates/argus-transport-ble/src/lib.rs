//! Bluetooth radio boundary for Argus.
//!
//! The core never talks to an adapter directly. Central-role operations go
//! through [`CentralLink`], the emitted peripheral through [`PeripheralLink`],
//! and every asynchronous outcome (sightings, connects, notifications) comes
//! back as a [`RadioEvent`] on a bounded channel. In-memory implementations
//! live in [`mock`]; enable the `btleplug` feature for the hardware central.

use argus_core::GattService;
use thiserror::Error;

#[cfg(feature = "btleplug")]
pub mod btleplug_backend;
pub mod event;
pub mod mock;

pub use event::{event_channel, EventReceiver, EventSender, RadioEvent, Sighting};
pub use mock::{CentralCall, MockCentral, MockPeripheral};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("radio worker is not running")]
    Closed,
    #[error("radio command queue is full")]
    QueueFull,
    #[error("bluetooth adapter unavailable")]
    AdapterUnavailable,
    #[error("unknown characteristic: {0}")]
    UnknownCharacteristic(String),
}

/// Advertisement payload for the local peripheral.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub local_name: String,
    pub service_uuids: Vec<String>,
    pub appearance: u16,
}

/// Central-role radio operations. Outcomes arrive as [`RadioEvent`]s.
pub trait CentralLink: Send + Sync {
    fn start_scan(&self) -> Result<(), LinkError>;
    fn stop_scan(&self) -> Result<(), LinkError>;
    fn connect(&self, address: &str) -> Result<(), LinkError>;
    fn disconnect(&self, address: &str) -> Result<(), LinkError>;
}

/// Local GATT server used to emit the virtual peripheral.
pub trait PeripheralLink: Send + Sync {
    fn add_service(&self, service: &GattService) -> Result<(), LinkError>;
    fn advertise(&self, advertisement: &Advertisement) -> Result<(), LinkError>;
    /// Updates a characteristic value and notifies subscribed clients.
    fn write_characteristic(&self, uuid: &str, value: &[u8]) -> Result<(), LinkError>;
    /// Adapter address, once the stack reports it.
    fn local_address(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(LinkError::Closed.to_string(), "radio worker is not running");
        assert_eq!(LinkError::QueueFull.to_string(), "radio command queue is full");
        assert_eq!(
            LinkError::UnknownCharacteristic("2a63".into()).to_string(),
            "unknown characteristic: 2a63"
        );
    }
}
