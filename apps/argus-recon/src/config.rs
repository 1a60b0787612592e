use argus_core::{ArgusError, OperatingMode};
use argus_node::NodeConfig;
use config::{Config, ConfigError, Environment, File};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ReconConfig {
    pub http_bind: String,
    pub http_port: u16,
    #[serde(with = "humantime_serde")]
    pub bridge_tick: Duration,
    #[serde(with = "humantime_serde")]
    pub integrity_tick: Duration,
    /// Period of the websocket status push.
    #[serde(with = "humantime_serde")]
    pub push_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub scan_window: Duration,
    #[serde(with = "humantime_serde")]
    pub scan_backoff: Duration,
    pub event_queue_capacity: usize,
    pub sim_base_power: i32,
    pub start_mode: String,
    pub local_name: String,
    pub self_signature: String,
    #[serde(deserialize_with = "deserialize_list")]
    pub ble_allowlist: Vec<String>,
}

fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ListVisitor;

    impl<'de> Visitor<'de> for ListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a sequence of strings")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(split_list(value))
        }

        fn visit_seq<S>(self, mut seq: S) -> Result<Self::Value, S::Error>
        where
            S: de::SeqAccess<'de>,
        {
            let mut vec = Vec::new();
            while let Some(element) = seq.next_element()? {
                vec.push(element);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(ListVisitor)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c| c == ',' || c == ';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl ReconConfig {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("http_bind", "0.0.0.0")?
            .set_default("http_port", 8080)?
            .set_default("bridge_tick", "1s")?
            .set_default("integrity_tick", "2s")?
            .set_default("push_interval", "200ms")?
            .set_default("scan_window", "10s")?
            .set_default("scan_backoff", "2s")?
            .set_default("event_queue_capacity", 256)?
            .set_default("sim_base_power", 150)?
            .set_default("start_mode", "sim")?
            .set_default("local_name", "Argus X-Link")?
            .set_default("self_signature", "argus")?
            .set_default("ble_allowlist", Vec::<String>::new())?;

        if let Some(path) = config_path {
            if path.extension().and_then(|ext| ext.to_str()) == Some("env") {
                // .env files feed the ARGUS_* environment source below.
                match dotenvy::from_path(&path) {
                    Ok(_) => tracing::info!("loaded environment from {}", path.display()),
                    Err(err) => {
                        tracing::warn!("failed to load .env from {}: {}", path.display(), err)
                    }
                }
            } else {
                builder = builder.add_source(File::from(path));
            }
        }

        builder = builder.add_source(Environment::with_prefix("ARGUS").try_parsing(true));

        builder.build()?.try_deserialize()
    }

    pub fn start_mode(&self) -> Result<OperatingMode, ArgusError> {
        self.start_mode.parse()
    }

    pub fn to_node_config(&self) -> Result<NodeConfig, ArgusError> {
        if self.event_queue_capacity == 0 {
            return Err(ArgusError::InvalidInput(
                "event_queue_capacity must be positive",
            ));
        }
        Ok(NodeConfig {
            bridge_tick: self.bridge_tick,
            integrity_tick: self.integrity_tick,
            scan_backoff: self.scan_backoff,
            scan_window: self.scan_window,
            event_queue_capacity: self.event_queue_capacity,
            sim_base_power: self.sim_base_power,
            start_mode: self.start_mode()?,
            local_name: self.local_name.clone(),
            self_signature: self.self_signature.clone(),
        })
    }
}
