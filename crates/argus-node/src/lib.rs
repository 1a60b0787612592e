//! Argus node: telemetry store, bridge engine, integrity classifier and the
//! runtime tasks that tie them to the radio boundary.
//!
//! Every component shares one [`state::TelemetryStore`]. Components touch it
//! only through short synchronous closures so the lock is never held across
//! an await point or a radio write.

pub mod bridge;
pub mod command;
pub mod config;
pub mod emitter;
pub mod fingerprint;
pub mod integrity;
pub mod link;
pub mod oui;
pub mod registry;
pub mod runtime;
pub mod state;

pub use bridge::{derive_outputs, BridgeEngine};
pub use command::{Command, CommandError, TransportCommand};
pub use config::NodeConfig;
pub use emitter::{EmitError, VirtualPeripheral};
pub use fingerprint::{compute_gatt_hash, evaluate_identity, DeviceFingerprint, IdentityVerdict};
pub use integrity::{IntegrityConfig, IntegrityEngine};
pub use link::{LinkConfig, LinkControl, SensorLinkManager, SensorRole};
pub use registry::DeviceRegistry;
pub use runtime::{NodeHandle, NodeRuntime};
pub use state::{StoreInner, TelemetrySnapshot, TelemetryStore};
