//! Tokio tasks driving the node: event pump, bridge tick, integrity tick and
//! scan supervisor. All share one store; shutdown goes through a watch
//! channel.

use std::sync::Arc;
use std::time::Duration;

use argus_core::{now_millis, OperatingMode};
use argus_transport_ble::{CentralLink, EventReceiver, LinkError, PeripheralLink};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::bridge::BridgeEngine;
use crate::command::Command;
use crate::config::NodeConfig;
use crate::emitter::{EmitError, VirtualPeripheral};
use crate::integrity::IntegrityEngine;
use crate::link::{LinkControl, SensorLinkManager};
use crate::state::{TelemetrySnapshot, TelemetryStore};

pub struct NodeRuntime {
    config: NodeConfig,
    store: TelemetryStore,
    central: Arc<dyn CentralLink>,
    peripheral: Arc<dyn PeripheralLink>,
    bridge: BridgeEngine,
}

impl NodeRuntime {
    pub fn new(
        config: NodeConfig,
        central: Arc<dyn CentralLink>,
        peripheral: Arc<dyn PeripheralLink>,
    ) -> Self {
        let store = TelemetryStore::with_telemetry(TelemetrySnapshot {
            sim_base_power: config.sim_base_power,
            mode: config.start_mode,
            ..TelemetrySnapshot::default()
        });
        Self {
            config,
            store,
            central,
            peripheral,
            bridge: BridgeEngine::from_entropy(),
        }
    }

    /// Replaces the noise source, e.g. with a seeded engine in tests.
    pub fn with_bridge_engine(mut self, bridge: BridgeEngine) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn store(&self) -> TelemetryStore {
        self.store.clone()
    }

    /// Provisions the virtual peripheral and spawns the tasks. Must be
    /// called inside a tokio runtime.
    pub fn start(self, events: EventReceiver) -> Result<NodeHandle, EmitError> {
        let NodeRuntime {
            config,
            store,
            central,
            peripheral,
            bridge,
        } = self;

        let emitter = VirtualPeripheral::new(peripheral, config.local_name.clone());
        emitter.provision(&store, now_millis())?;

        let control = LinkControl::new(store.clone(), central);
        let integrity = IntegrityEngine::new(config.integrity_config());
        let manager = SensorLinkManager::new(control.clone(), integrity.clone(), config.link_config());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = vec![
            tokio::spawn(event_pump(manager, events, shutdown_rx.clone())),
            tokio::spawn(bridge_loop(
                bridge,
                emitter,
                store.clone(),
                config.bridge_tick,
                shutdown_rx.clone(),
            )),
            tokio::spawn(integrity_loop(
                integrity,
                store.clone(),
                config.integrity_tick,
                shutdown_rx.clone(),
            )),
            tokio::spawn(scan_supervisor(
                control.clone(),
                config.scan_backoff,
                config.scan_window,
                shutdown_rx,
            )),
        ];
        info!(mode = %config.start_mode, "node runtime started");

        Ok(NodeHandle {
            store,
            control,
            shutdown_tx,
            tasks,
        })
    }
}

/// Handle returned by [`NodeRuntime::start`].
pub struct NodeHandle {
    store: TelemetryStore,
    control: LinkControl,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub fn control(&self) -> &LinkControl {
        &self.control
    }

    pub fn apply(&self, commands: &[Command]) -> Result<(), LinkError> {
        self.control.apply(commands)
    }

    /// Signals every task and waits for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(%err, "runtime task ended abnormally");
            }
        }
        info!("node runtime stopped");
    }
}

async fn event_pump(
    mut manager: SensorLinkManager,
    mut events: EventReceiver,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else {
                    debug!("radio event channel closed");
                    break;
                };
                manager.handle_event(event, now_millis());
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn bridge_loop(
    mut engine: BridgeEngine,
    mut emitter: VirtualPeripheral,
    store: TelemetryStore,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let out = engine.tick(&store);
                if let Err(err) = emitter.emit(out) {
                    warn!(%err, "emit failed");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn integrity_loop(
    engine: IntegrityEngine,
    store: TelemetryStore,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => engine.recompute(&store, now_millis()),
            _ = shutdown.changed() => break,
        }
    }
}

fn needs_trainer_scan(t: &TelemetrySnapshot) -> bool {
    let connecting = t
        .trainer_address
        .as_ref()
        .is_some_and(|a| t.connecting.contains(a));
    t.mode == OperatingMode::Bridge && !t.connected_real_sensor && !connecting
}

/// Runs a bounded scan whenever bridge mode is waiting for a trainer.
async fn scan_supervisor(
    control: LinkControl,
    backoff: Duration,
    window: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = time::sleep(backoff) => {}
            _ = shutdown.changed() => break,
        }
        if !control.store().read(|inner| needs_trainer_scan(&inner.telemetry)) {
            continue;
        }
        if let Err(err) = control.start_scan() {
            warn!(%err, "scan start failed, retrying after backoff");
            continue;
        }
        debug!(window_ms = window.as_millis() as u64, "scanning for trainer");
        let stopped = tokio::select! {
            _ = time::sleep(window) => false,
            _ = shutdown.changed() => true,
        };
        if let Err(err) = control.stop_scan() {
            debug!(%err, "scan stop failed");
        }
        if stopped {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_needed_only_while_waiting_for_trainer() {
        let mut t = TelemetrySnapshot::default();
        assert!(!needs_trainer_scan(&t));
        t.mode = OperatingMode::Bridge;
        assert!(needs_trainer_scan(&t));
        t.trainer_address = Some("aa".into());
        t.connecting.insert("aa".into());
        assert!(!needs_trainer_scan(&t));
        t.connecting.clear();
        t.connected_real_sensor = true;
        assert!(!needs_trainer_scan(&t));
    }
}
