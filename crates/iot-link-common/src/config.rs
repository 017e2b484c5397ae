//! ---
//! iot_section: "01-core-functionality"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Shared primitives and utilities for the core runtime."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

fn default_local_tier_enabled() -> bool {
    true
}

fn default_peer_link_cooldown() -> Duration {
    Duration::from_secs(30)
}

fn default_long_poll_cooldown() -> Duration {
    Duration::from_secs(300)
}

fn default_long_poll_scheme() -> String {
    "http".to_owned()
}

fn default_long_poll_port() -> u16 {
    8069
}

fn default_action_path() -> String {
    "/iot_drivers/action".to_owned()
}

fn default_event_path() -> String {
    "/iot_drivers/event".to_owned()
}

fn default_long_poll_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_socket_stream_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_peer_link_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

/// Primary configuration object for the IoT Link runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cascade: CascadeConfig,
    #[serde(default)]
    pub transports: TransportsConfig,
    /// Known IoT boxes keyed by their numeric record id.
    #[serde(default)]
    pub boxes: IndexMap<String, BoxConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "IOT_LINK_CONFIG";

    /// Load configuration from disk, respecting the `IOT_LINK_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Retrieve a box record by its numeric identifier.
    pub fn box_config(&self, box_id: u64) -> Option<&BoxConfig> {
        self.boxes
            .iter()
            .find(|(key, _)| key.trim().parse::<u64>().ok() == Some(box_id))
            .map(|(_, record)| record)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        for (key, record) in &self.boxes {
            key.trim()
                .parse::<u64>()
                .map_err(|_| anyhow!("box key '{}' is not a numeric record id", key))?;
            record.validate(key)?;
        }
        self.transports.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Which transport tier the cascade starts with.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModePreference {
    /// Start with the peer link, then long polling, then the relay.
    #[default]
    Local,
    /// Start with the relay socket and only fall back to the local tier afterwards.
    Remote,
}

impl ModePreference {
    pub fn toggled(self) -> Self {
        match self {
            ModePreference::Local => ModePreference::Remote,
            ModePreference::Remote => ModePreference::Local,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModePreference::Local => "local",
            ModePreference::Remote => "remote",
        }
    }
}

impl std::str::FromStr for ModePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(ModePreference::Local),
            "remote" => Ok(ModePreference::Remote),
            other => Err(format!("unknown mode preference: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    #[serde(default)]
    pub prefer: ModePreference,
    /// When false the peer link and long polling stages are never attempted.
    #[serde(default = "default_local_tier_enabled")]
    pub local_tier_enabled: bool,
    #[serde(default)]
    pub cooldown: CooldownConfig,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            prefer: ModePreference::default(),
            local_tier_enabled: default_local_tier_enabled(),
            cooldown: CooldownConfig::default(),
        }
    }
}

/// Per-transport suppression windows. A zero window never suppresses a stage.
#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CooldownConfig {
    #[serde(default = "default_peer_link_cooldown")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub peer_link: Duration,
    #[serde(default = "default_long_poll_cooldown")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub long_poll: Duration,
    #[serde(default)]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub socket_stream: Duration,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            peer_link: default_peer_link_cooldown(),
            long_poll: default_long_poll_cooldown(),
            socket_stream: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportsConfig {
    #[serde(default)]
    pub peer_link: PeerLinkConfig,
    #[serde(default)]
    pub long_poll: LongPollConfig,
    #[serde(default)]
    pub socket_stream: SocketStreamConfig,
}

impl TransportsConfig {
    pub fn validate(&self) -> Result<()> {
        self.peer_link.validate()?;
        self.long_poll.validate()?;
        self.socket_stream.validate()?;
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerLinkConfig {
    #[serde(default = "default_peer_link_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for PeerLinkConfig {
    fn default() -> Self {
        Self {
            timeout: default_peer_link_timeout(),
        }
    }
}

impl PeerLinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(anyhow!("transports.peer_link.timeout must be non-zero"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongPollConfig {
    #[serde(default = "default_long_poll_scheme")]
    pub scheme: String,
    #[serde(default = "default_long_poll_port")]
    pub port: u16,
    #[serde(default = "default_action_path")]
    pub action_path: String,
    #[serde(default = "default_event_path")]
    pub event_path: String,
    #[serde(default = "default_long_poll_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for LongPollConfig {
    fn default() -> Self {
        Self {
            scheme: default_long_poll_scheme(),
            port: default_long_poll_port(),
            action_path: default_action_path(),
            event_path: default_event_path(),
            timeout: default_long_poll_timeout(),
        }
    }
}

impl LongPollConfig {
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(anyhow!(
                "transports.long_poll.scheme must be http or https, got '{}'",
                self.scheme
            ));
        }
        for (name, path) in [
            ("action_path", &self.action_path),
            ("event_path", &self.event_path),
        ] {
            if !path.starts_with('/') {
                return Err(anyhow!(
                    "transports.long_poll.{} must start with '/', got '{}'",
                    name,
                    path
                ));
            }
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("transports.long_poll.timeout must be non-zero"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketStreamConfig {
    /// Relay endpoint; the socket stage is unavailable when unset.
    #[serde(default)]
    pub relay_url: Option<String>,
    #[serde(default = "default_socket_stream_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for SocketStreamConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            timeout: default_socket_stream_timeout(),
        }
    }
}

impl SocketStreamConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(raw) = &self.relay_url {
            let url = Url::parse(raw)
                .with_context(|| format!("transports.socket_stream.relay_url '{}' is invalid", raw))?;
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(anyhow!(
                    "transports.socket_stream.relay_url must use ws or wss, got '{}'",
                    url.scheme()
                ));
            }
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("transports.socket_stream.timeout must be non-zero"));
        }
        Ok(())
    }
}

/// Network identity of one IoT box as stored in the record store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoxConfig {
    pub ip: String,
    pub identifier: String,
}

impl BoxConfig {
    pub fn validate(&self, key: &str) -> Result<()> {
        if self.identifier.trim().is_empty() {
            return Err(anyhow!("box '{}' must declare a non-empty identifier", key));
        }
        self.ip
            .parse::<IpAddr>()
            .map_err(|err| anyhow!("box '{}' has invalid ip '{}': {}", key, self.ip, err))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Default filter directive when neither `IOT_LINK_LOG` nor `RUST_LOG` is set.
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}
