//! HTTP and websocket surface of the recon node.

use std::collections::HashMap;
use std::time::Duration;

use argus_core::{DiscoveredDevice, IntegrityReport};
use argus_node::{LinkControl, StoreInner, TelemetryStore, TransportCommand};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: TelemetryStore,
    pub control: LinkControl,
    pub push_interval: Duration,
}

/// Status object pushed on `/ws` and served on `/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub mode: String,
    pub boost_value: i32,
    pub boost_type: String,
    pub sim_base_power: i32,
    pub real_power: i32,
    pub real_cadence: i32,
    #[serde(rename = "realHR")]
    pub real_hr: i32,
    pub output_power: i32,
    pub output_cadence: i32,
    #[serde(rename = "outputHR")]
    pub output_hr: i32,
    pub connected: bool,
    pub hr_connected: bool,
    pub client_conn: bool,
    pub integrity: Option<IntegrityReport>,
}

impl StatusPayload {
    pub fn capture(inner: &StoreInner) -> Self {
        let t = &inner.telemetry;
        Self {
            mode: t.mode.to_string(),
            boost_value: t.boost.value,
            boost_type: t.boost.kind.as_str().to_string(),
            sim_base_power: t.sim_base_power,
            real_power: t.real_power,
            real_cadence: t.real_cadence,
            real_hr: t.real_heart_rate,
            output_power: t.output_power,
            output_cadence: t.output_cadence,
            output_hr: t.output_heart_rate,
            connected: t.connected_real_sensor,
            hr_connected: t.connected_heart_rate_sensor,
            client_conn: t.client_connected,
            integrity: inner.active_report.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityResponse {
    pub reports: HashMap<String, IntegrityReport>,
    pub active: Option<IntegrityReport>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/devices", get(devices))
        .route("/integrity", get(integrity))
        .route("/ws", get(telemetry_ws))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<AppState>) -> Json<StatusPayload> {
    Json(state.store.read(StatusPayload::capture))
}

async fn devices(State(state): State<AppState>) -> Json<Vec<DiscoveredDevice>> {
    let ordered: Vec<DiscoveredDevice> = state
        .store
        .read(|inner| inner.registry.ordered().into_iter().cloned().collect());
    Json(ordered)
}

async fn integrity(State(state): State<AppState>) -> Json<IntegrityResponse> {
    Json(state.store.read(|inner| IntegrityResponse {
        reports: inner.reports.clone(),
        active: inner.active_report.clone(),
    }))
}

async fn telemetry_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| telemetry_session(socket, state))
}

/// Pushes status at the configured interval and applies inbound commands
/// until either side closes.
async fn telemetry_session(socket: WebSocket, state: AppState) {
    info!("telemetry client attached");
    let (mut sender, mut receiver) = socket.split();
    let mut ticker = time::interval(state.push_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let payload = match serde_json::to_string(&state.store.read(StatusPayload::capture)) {
                    Ok(value) => value,
                    Err(err) => {
                        warn!(%err, "status encode failed");
                        continue;
                    }
                };
                if sender.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_command(&state.control, &text),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    info!("telemetry client detached");
}

/// Parses one inbound command object and applies it. Malformed input is
/// logged and dropped.
pub(crate) fn handle_command(control: &LinkControl, text: &str) {
    let commands = match TransportCommand::parse(text).and_then(TransportCommand::into_commands) {
        Ok(commands) => commands,
        Err(err) => {
            warn!(%err, "rejected transport command");
            return;
        }
    };
    debug!(count = commands.len(), "applying transport commands");
    if let Err(err) = control.apply(&commands) {
        warn!(%err, "disconnect request failed");
    }
}
