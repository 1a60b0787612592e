use std::time::Duration;

use argus_core::OperatingMode;

use crate::integrity::IntegrityConfig;
use crate::link::LinkConfig;
use crate::state::DEFAULT_SIM_BASE_POWER;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Period of the bridge/simulation derivation.
    pub bridge_tick: Duration,
    /// Period of the integrity recompute.
    pub integrity_tick: Duration,
    /// Pause between scan supervisor checks.
    pub scan_backoff: Duration,
    /// How long one supervised scan runs.
    pub scan_window: Duration,
    pub event_queue_capacity: usize,
    pub sim_base_power: i32,
    pub start_mode: OperatingMode,
    /// Name the emitted peripheral advertises.
    pub local_name: String,
    /// Case-insensitive name fragment that marks this bridge's own output.
    pub self_signature: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bridge_tick: Duration::from_secs(1),
            integrity_tick: Duration::from_secs(2),
            scan_backoff: Duration::from_secs(2),
            scan_window: Duration::from_secs(10),
            event_queue_capacity: 256,
            sim_base_power: DEFAULT_SIM_BASE_POWER,
            start_mode: OperatingMode::Simulation,
            local_name: "Argus X-Link".to_string(),
            self_signature: "argus".to_string(),
        }
    }
}

impl NodeConfig {
    pub fn integrity_config(&self) -> IntegrityConfig {
        IntegrityConfig {
            self_signature: self.self_signature.clone(),
        }
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            local_name: self.local_name.clone(),
            self_signature: self.self_signature.clone(),
        }
    }
}
