use std::collections::HashMap;
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use argus_core::{now_millis, GattCharacteristic, GattService};
use argus_gatt::uuids::{short_from_uuid, CHAR_CYCLING_POWER_MEASUREMENT, CHAR_HEART_RATE_MEASUREMENT};
use btleplug::api::{Central, CentralEvent, CharPropFlags, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::event::{EventSender, RadioEvent, Sighting};
use crate::{CentralLink, LinkError};

#[derive(Debug, Clone)]
pub struct BtleplugCentralConfig {
    pub command_queue_capacity: usize,
    /// How long `spawn` waits for the adapter to come up.
    pub ready_timeout: Duration,
    /// Addresses to report; empty reports everything.
    pub allowlist: Vec<String>,
}

impl Default for BtleplugCentralConfig {
    fn default() -> Self {
        Self {
            command_queue_capacity: 64,
            ready_timeout: Duration::from_secs(5),
            allowlist: Vec::new(),
        }
    }
}

#[derive(Debug)]
enum Command {
    StartScan,
    StopScan,
    Connect(String),
    Disconnect(String),
}

/// Hardware central backed by btleplug, driven from a dedicated thread.
#[derive(Debug)]
pub struct BtleplugCentral {
    command_tx: mpsc::Sender<Command>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl BtleplugCentral {
    /// Opens the first adapter and starts the worker. Blocks until the
    /// adapter is ready or `ready_timeout` elapses.
    pub fn spawn(config: BtleplugCentralConfig, events: EventSender) -> Result<Self, LinkError> {
        let (command_tx, command_rx) = mpsc::channel(config.command_queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), LinkError>>();
        let worker_config = config.clone();

        let worker = thread::Builder::new()
            .name("argus-ble".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(err) => {
                        warn!(%err, "ble runtime failed to start");
                        let _ = ready_tx.send(Err(LinkError::AdapterUnavailable));
                        return;
                    }
                };
                runtime.block_on(async move {
                    let adapter = match open_adapter().await {
                        Ok(adapter) => adapter,
                        Err(err) => {
                            let _ = ready_tx.send(Err(err));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));
                    run_worker(worker_config, adapter, command_rx, events, shutdown_rx).await;
                });
            })
            .map_err(|_| LinkError::AdapterUnavailable)?;

        match ready_rx.recv_timeout(config.ready_timeout) {
            Ok(Ok(())) => Ok(Self {
                command_tx,
                shutdown_tx: Some(shutdown_tx),
                worker: Some(worker),
            }),
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => Err(LinkError::AdapterUnavailable),
        }
    }

    fn send(&self, command: Command) -> Result<(), LinkError> {
        self.command_tx.try_send(command).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => LinkError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => LinkError::Closed,
        })
    }
}

impl CentralLink for BtleplugCentral {
    fn start_scan(&self) -> Result<(), LinkError> {
        self.send(Command::StartScan)
    }

    fn stop_scan(&self) -> Result<(), LinkError> {
        self.send(Command::StopScan)
    }

    fn connect(&self, address: &str) -> Result<(), LinkError> {
        self.send(Command::Connect(address.to_string()))
    }

    fn disconnect(&self, address: &str) -> Result<(), LinkError> {
        self.send(Command::Disconnect(address.to_string()))
    }
}

impl Drop for BtleplugCentral {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

async fn open_adapter() -> Result<Adapter, LinkError> {
    let manager = Manager::new().await.map_err(|err| {
        warn!(%err, "bluetooth manager unavailable");
        LinkError::AdapterUnavailable
    })?;
    let adapters = manager.adapters().await.map_err(|err| {
        warn!(%err, "failed to list bluetooth adapters");
        LinkError::AdapterUnavailable
    })?;
    let adapter = adapters
        .into_iter()
        .next()
        .ok_or(LinkError::AdapterUnavailable)?;
    if let Ok(info) = adapter.adapter_info().await {
        info!(adapter = %info, "bluetooth adapter ready");
    }
    Ok(adapter)
}

async fn run_worker(
    config: BtleplugCentralConfig,
    adapter: Adapter,
    mut commands: mpsc::Receiver<Command>,
    events: EventSender,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut adapter_events = match adapter.events().await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(%err, "adapter event stream unavailable");
            return;
        }
    };
    let mut known = HashMap::<String, Peripheral>::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            maybe_event = adapter_events.next() => {
                let Some(event) = maybe_event else { break };
                handle_adapter_event(&adapter, &config, event, &mut known, &events).await;
            }
            maybe_command = commands.recv() => {
                let Some(command) = maybe_command else { break };
                handle_command(&adapter, command, &known, &events).await;
            }
        }
    }
    let _ = adapter.stop_scan().await;
}

async fn handle_adapter_event(
    adapter: &Adapter,
    config: &BtleplugCentralConfig,
    event: CentralEvent,
    known: &mut HashMap<String, Peripheral>,
    events: &EventSender,
) {
    let id = match event {
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
        CentralEvent::DeviceDisconnected(id) => {
            if let Ok(peripheral) = adapter.peripheral(&id).await {
                let address = peripheral.address().to_string();
                let _ = events.send(RadioEvent::Disconnected { address }).await;
            }
            return;
        }
        _ => return,
    };

    let Ok(peripheral) = adapter.peripheral(&id).await else {
        return;
    };
    let address = peripheral.address().to_string();
    if !config.allowlist.is_empty()
        && !config.allowlist.iter().any(|a| a.eq_ignore_ascii_case(&address))
    {
        return;
    }
    let props = match peripheral.properties().await {
        Ok(Some(props)) => props,
        _ => return,
    };

    let mut sighting = Sighting::new(
        address.clone(),
        props.local_name.unwrap_or_default(),
        props.rssi.unwrap_or(0),
    );
    sighting.service_uuids = props.services.iter().map(|u| u.to_string()).collect();
    sighting.manufacturer_data = first_manufacturer_record(&props.manufacturer_data);
    known.insert(address, peripheral);

    if let Err(err) = events.try_send(RadioEvent::Sighting(sighting)) {
        debug!(%err, "dropping sighting");
    }
}

async fn handle_command(
    adapter: &Adapter,
    command: Command,
    known: &HashMap<String, Peripheral>,
    events: &EventSender,
) {
    match command {
        Command::StartScan => {
            if let Err(err) = adapter.start_scan(ScanFilter::default()).await {
                warn!(%err, "start scan failed");
            }
        }
        Command::StopScan => {
            if let Err(err) = adapter.stop_scan().await {
                warn!(%err, "stop scan failed");
            }
        }
        Command::Connect(address) => match known.get(&address).cloned() {
            Some(peripheral) => {
                tokio::spawn(connect_and_stream(peripheral, address, events.clone()));
            }
            None => {
                let _ = events
                    .send(RadioEvent::ConnectFailed {
                        address,
                        reason: "peripheral not seen".into(),
                    })
                    .await;
            }
        },
        Command::Disconnect(address) => {
            if let Some(peripheral) = known.get(&address) {
                if let Err(err) = peripheral.disconnect().await {
                    warn!(address = %address, %err, "disconnect failed");
                }
            }
        }
    }
}

async fn connect_and_stream(peripheral: Peripheral, address: String, events: EventSender) {
    if let Err(err) = connect_and_subscribe(&peripheral).await {
        let _ = events
            .send(RadioEvent::ConnectFailed {
                address,
                reason: err.to_string(),
            })
            .await;
        return;
    }
    let mut notifications = match peripheral.notifications().await {
        Ok(stream) => stream,
        Err(err) => {
            let _ = events
                .send(RadioEvent::ConnectFailed {
                    address,
                    reason: err.to_string(),
                })
                .await;
            return;
        }
    };

    let services = describe_services(&peripheral);
    info!(address = %address, services = services.len(), "peripheral connected");
    if events
        .send(RadioEvent::Connected {
            address: address.clone(),
            services,
        })
        .await
        .is_err()
    {
        return;
    }

    while let Some(notification) = notifications.next().await {
        let event = RadioEvent::Notification {
            address: address.clone(),
            characteristic: notification.uuid.to_string(),
            value: notification.value,
            received_at_ms: now_millis(),
        };
        if let Err(mpsc::error::TrySendError::Closed(_)) = events.try_send(event) {
            break;
        }
    }
    debug!(address = %address, "notification stream ended");
}

async fn connect_and_subscribe(peripheral: &Peripheral) -> Result<(), btleplug::Error> {
    peripheral.connect().await?;
    peripheral.discover_services().await?;
    for ch in peripheral.characteristics() {
        let short = short_from_uuid(&ch.uuid.to_string());
        let wanted = matches!(
            short,
            Some(CHAR_CYCLING_POWER_MEASUREMENT | CHAR_HEART_RATE_MEASUREMENT)
        );
        if wanted && ch.properties.contains(CharPropFlags::NOTIFY) {
            peripheral.subscribe(&ch).await?;
        }
    }
    Ok(())
}

fn describe_services(peripheral: &Peripheral) -> Vec<GattService> {
    peripheral
        .services()
        .into_iter()
        .map(|service| GattService {
            uuid: service.uuid.to_string(),
            characteristics: service
                .characteristics
                .iter()
                .map(|c| GattCharacteristic {
                    uuid: c.uuid.to_string(),
                    properties: property_names(c.properties),
                })
                .collect(),
        })
        .collect()
}

fn property_names(flags: CharPropFlags) -> String {
    const NAMES: [(CharPropFlags, &str); 8] = [
        (CharPropFlags::BROADCAST, "broadcast"),
        (CharPropFlags::READ, "read"),
        (CharPropFlags::WRITE_WITHOUT_RESPONSE, "write-without-response"),
        (CharPropFlags::WRITE, "write"),
        (CharPropFlags::NOTIFY, "notify"),
        (CharPropFlags::INDICATE, "indicate"),
        (CharPropFlags::AUTHENTICATED_SIGNED_WRITES, "authenticated-signed-writes"),
        (CharPropFlags::EXTENDED_PROPERTIES, "extended-properties"),
    ];
    NAMES
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(",")
}

/// Company id (LE) followed by payload, for the lowest company id present.
fn first_manufacturer_record(data: &HashMap<u16, Vec<u8>>) -> Option<Vec<u8>> {
    let (company, payload) = data.iter().min_by_key(|(company, _)| **company)?;
    let mut record = company.to_le_bytes().to_vec();
    record.extend_from_slice(payload);
    Some(record)
}
