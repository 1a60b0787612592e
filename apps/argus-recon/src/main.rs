mod config;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use argus_core::OperatingMode;
use argus_node::NodeRuntime;
use argus_transport_ble::{
    event_channel, CentralLink, EventSender, LinkError, MockPeripheral, PeripheralLink,
};
use clap::Parser;
use tracing::{error, info};

use crate::config::ReconConfig;
use crate::server::{build_router, AppState};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (.toml or .env)
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Start mode, overrides the configured one (sim or bridge)
    #[arg(long)]
    mode: Option<OperatingMode>,
}

#[cfg(feature = "ble-btleplug")]
fn open_central(
    config: &ReconConfig,
    events: EventSender,
) -> Result<Arc<dyn CentralLink>, LinkError> {
    use argus_transport_ble::btleplug_backend::{BtleplugCentral, BtleplugCentralConfig};

    let backend = BtleplugCentralConfig {
        allowlist: config.ble_allowlist.clone(),
        ..BtleplugCentralConfig::default()
    };
    let central = BtleplugCentral::spawn(backend, events)?;
    info!("bluetooth adapter ready");
    Ok(Arc::new(central))
}

#[cfg(not(feature = "ble-btleplug"))]
fn open_central(
    config: &ReconConfig,
    _events: EventSender,
) -> Result<Arc<dyn CentralLink>, LinkError> {
    if !config.ble_allowlist.is_empty() {
        tracing::warn!("ble_allowlist has no effect without the ble-btleplug feature");
    }
    tracing::warn!("built without ble-btleplug, using an offline central");
    Ok(Arc::new(argus_transport_ble::MockCentral::new()))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() {
    let filter = std::env::var("ARGUS_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let config = match ReconConfig::new(cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to load config: {err}");
            std::process::exit(1);
        }
    };
    let mut node_config = match config.to_node_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("invalid config: {err}");
            std::process::exit(1);
        }
    };
    if let Some(mode) = cli.mode {
        node_config.start_mode = mode;
    }

    // The sender is held here so the event pump outlives an offline central.
    let (events_tx, events_rx) = event_channel(node_config.event_queue_capacity);
    let central = match open_central(&config, events_tx.clone()) {
        Ok(central) => central,
        Err(err) => {
            error!("bluetooth adapter unavailable: {err}");
            std::process::exit(1);
        }
    };
    let peripheral: Arc<dyn PeripheralLink> = Arc::new(MockPeripheral::new());

    let handle = match NodeRuntime::new(node_config, central, peripheral).start(events_rx) {
        Ok(handle) => handle,
        Err(err) => {
            error!("virtual peripheral provisioning failed: {err}");
            std::process::exit(1);
        }
    };

    let router = build_router(AppState {
        store: handle.store().clone(),
        control: handle.control().clone(),
        push_interval: config.push_interval,
    });
    let bind_addr = format!("{}:{}", config.http_bind, config.http_port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("http bind failed on {bind_addr}: {err}");
            handle.shutdown().await;
            std::process::exit(1);
        }
    };
    info!("telemetry interface at http://{bind_addr}");

    if let Err(err) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("http server error: {err}");
    }

    handle.shutdown().await;
    drop(events_tx);
}
