use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),

    #[error("invalid config: {field} must be greater than zero")]
    Invalid { field: &'static str },
}

/// WebSocket broadcast relay server
///
/// Flags left unset do not override lower layers, so a value from the TOML
/// file survives unless the flag (or its env var) is given.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "relay-server", version, about = "WebSocket broadcast relay server")]
pub struct CliArgs {
    /// Port to listen on [default: 8765]
    #[arg(long, env = "RELAY_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 127.0.0.1]
    #[arg(long, env = "RELAY_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./relay.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging
    #[arg(long, env = "RELAY_JSON_LOGS")]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    pub port: u16,

    pub bind_address: String,

    #[serde(default)]
    pub json_logs: bool,

    /// Set from the command line only
    #[serde(skip)]
    pub generate_config: bool,

    /// Per-connection settings (loaded from [ws] section in TOML)
    #[serde(default)]
    pub ws: WsConfig,
}

/// Per-connection limits and heartbeat timing.
/// Exposed in `relay.toml` under the `[ws]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WsConfig {
    /// Outbound frames buffered per client before relays to it are dropped
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Largest inbound frame accepted, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Longest client id accepted in the handshake path, in bytes
    #[serde(default = "default_max_client_id_len")]
    pub max_client_id_len: usize,

    /// Seconds between server pings
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            max_message_size: default_max_message_size(),
            max_client_id_len: default_max_client_id_len(),
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
        }
    }
}

impl WsConfig {
    /// Reject values the connection actor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("ws.max_queue_size", self.max_queue_size as u64),
            ("ws.max_message_size", self.max_message_size as u64),
            ("ws.max_client_id_len", self.max_client_id_len as u64),
            ("ws.ping_interval_secs", self.ping_interval_secs),
            ("ws.pong_timeout_secs", self.pong_timeout_secs),
        ];
        match checks.iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(ConfigError::Invalid { field: *field }),
            None => Ok(()),
        }
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

fn default_max_queue_size() -> usize {
    256
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_max_client_id_len() -> usize {
    128
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    10
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8765,
            bind_address: "127.0.0.1".to_string(),
            json_logs: false,
            generate_config: false,
            ws: WsConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (RELAY_*) < CLI args
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();
        let mut config = Self::from_cli(&cli)?;
        config.generate_config = cli.generate_config;
        Ok(config)
    }

    fn from_cli(cli: &CliArgs) -> Result<Self, ConfigError> {
        let config: RelayConfig = Self::figment(cli).extract().map_err(Box::new)?;
        config.ws.validate()?;
        Ok(config)
    }

    fn figment(cli: &CliArgs) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(RelayConfig::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("RELAY_").split("__"))
            .merge(Serialized::defaults(cli))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Relay Server Configuration
# Place this file at ./relay.toml or specify with --config <path>
# All settings can be overridden via environment variables (RELAY_PORT,
# RELAY_WS__MAX_QUEUE_SIZE, etc.) or CLI flags (--port, etc.)

# Server port (default: 8765)
# port = 8765

# Bind address (default: 127.0.0.1)
# bind_address = "127.0.0.1"

# Enable structured JSON logging
# json_logs = false

# ---- Connections ----
# [ws]

# Outbound frames buffered per client; relays beyond this are dropped
# max_queue_size = 256

# Largest inbound frame in bytes (64 KiB)
# max_message_size = 65536

# Longest client id accepted in the handshake path
# max_client_id_len = 128

# Heartbeat: ping every N seconds, close if no pong within M seconds
# ping_interval_secs = 30
# pong_timeout_secs = 10
"#
    .to_string()
}
