use std::time::Duration;

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::relay::RelaySettings;

/// Event chat relay server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "event-relay", version, about = "WebSocket chat relay for event rooms")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "RELAY_PORT", default_value = "8040")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "RELAY_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./relay.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "RELAY_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, JWT signing key)
    #[arg(long, env = "RELAY_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Base URL prepended to stored avatar paths in outbound messages
    #[arg(long, env = "RELAY_CDN_BASE_URL")]
    pub cdn_base_url: Option<String>,

    /// WebSocket liveness and queue tuning (loaded from [ws] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws: Option<WsConfig>,
}

/// Timing and sizing knobs for the relay's WebSocket connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Seconds to wait for a pong before declaring the peer dead (default: 60)
    #[serde(default = "default_pong_wait")]
    pub pong_wait_secs: u64,

    /// Upper bound in seconds on any single socket write (default: 30)
    #[serde(default = "default_write_wait")]
    pub write_wait_secs: u64,

    /// Maximum inbound text frame size in bytes (default: 512)
    #[serde(default = "default_max_frame")]
    pub max_frame_bytes: usize,

    /// Per-connection outbound queue capacity (default: 100)
    #[serde(default = "default_outbound_capacity")]
    pub outbound_queue_capacity: usize,

    /// Shared dispatcher inbound queue capacity (default: 1000)
    #[serde(default = "default_inbound_capacity")]
    pub inbound_queue_capacity: usize,
}

impl WsConfig {
    /// Collapse the config block into the runtime settings the relay carries.
    pub fn settings(&self) -> RelaySettings {
        RelaySettings {
            pong_wait: Duration::from_secs(self.pong_wait_secs),
            write_wait: Duration::from_secs(self.write_wait_secs),
            max_frame_bytes: self.max_frame_bytes,
            outbound_capacity: self.outbound_queue_capacity,
        }
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            pong_wait_secs: default_pong_wait(),
            write_wait_secs: default_write_wait(),
            max_frame_bytes: default_max_frame(),
            outbound_queue_capacity: default_outbound_capacity(),
            inbound_queue_capacity: default_inbound_capacity(),
        }
    }
}

fn default_pong_wait() -> u64 {
    60
}

fn default_write_wait() -> u64 {
    30
}

fn default_max_frame() -> usize {
    512
}

fn default_outbound_capacity() -> usize {
    100
}

fn default_inbound_capacity() -> usize {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8040,
            bind_address: "0.0.0.0".to_string(),
            config: "./relay.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            cdn_base_url: None,
            ws: Some(WsConfig::default()),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (RELAY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("RELAY_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Event Relay Server Configuration
# Place this file at ./relay.toml or specify with --config <path>
# All settings can be overridden via environment variables (RELAY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8040)
# port = 8040

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database and JWT signing key
# data_dir = "./data"

# Base URL prepended to stored avatar paths in outbound messages
# cdn_base_url = "https://cdn.example.com"

# ---- WebSocket tuning ----
# [ws]

# Seconds to wait for a pong before declaring the peer dead.
# The server pings on a fixed period of 9/10 of this value.
# pong_wait_secs = 60

# Upper bound in seconds on any single socket write
# write_wait_secs = 30

# Maximum inbound text frame size in bytes; larger frames close the connection
# max_frame_bytes = 512

# Per-connection outbound queue capacity; when a member's queue is full,
# messages are dropped for that member only
# outbound_queue_capacity = 100

# Shared dispatcher inbound queue capacity
# inbound_queue_capacity = 1000
"#
    .to_string()
}
