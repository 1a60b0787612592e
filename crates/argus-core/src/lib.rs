//! Core Argus primitives shared across crates.
//!
//! Includes the telemetry/device data model, integrity report types, the
//! digest helper used for GATT fingerprints, and the base error type.

pub mod clock;
pub mod error;
pub mod hash;
pub mod types;

pub use clock::now_millis;
pub use error::ArgusError;
pub use types::{
    BoostConfig, BoostKind, Classification, DiscoveredDevice, GattCharacteristic, GattService,
    IntegrityReport, IntegritySignals, OperatingMode, OutputTelemetry, LOCAL_VIRTUAL_PLACEHOLDER,
    MAX_HEART_RATE_BPM, ROLLING_SAMPLE_CAP,
};
