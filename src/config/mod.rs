//! # Configuration Management
//!
//! TOML configuration for the gateway: the serial link, the protocol
//! engine's timing knobs, logging, and an optional list of node identifiers
//! to enforce after discovery sweeps.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud = 115200
//!
//! [gateway]
//! tick_interval_ms = 50
//! discovery_timeout_ms = 5000
//! tx_queue_limit = 50
//! debug_dump = false
//!
//! [logging]
//! level = "info"
//!
//! # Optional: keep these radios named. Addresses are 64-bit hex.
//! [[nodes]]
//! address = "0013A20040A1B2C3"
//! node_id = "pump-room"
//! ```
//!
//! All values are validated on load; a bad baud rate or an over-long node
//! identifier is rejected before the device is ever opened.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::radio::codec::MAX_NODE_ID;
use crate::radio::{LongAddress, SUPPORTED_BAUDS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Node identifiers to reconcile after each discovery sweep.
    #[serde(default)]
    pub nodes: Vec<NodeIdEntry>,
}

/// Serial link to the radio module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

/// Protocol engine timing and queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Background scheduler tick, milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// How long a discovery sweep collects responses, milliseconds.
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
    /// Outbound queue capacity; overflow evicts the oldest frame.
    #[serde(default = "default_tx_queue_limit")]
    pub tx_queue_limit: usize,
    /// Hex-dump every frame written to or read from the wire at debug level.
    #[serde(default)]
    pub debug_dump: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// One `[[nodes]]` entry: a radio address (64-bit hex string) and the node
/// identifier it should carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdEntry {
    pub address: String,
    pub node_id: String,
}

impl NodeIdEntry {
    /// Parse the hex address field.
    pub fn address(&self) -> Option<LongAddress> {
        let raw = self
            .address
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        LongAddress::from_str_radix(raw, 16).ok()
    }
}

fn default_baud() -> u32 {
    115200
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_discovery_timeout_ms() -> u64 {
    5000
}

fn default_tx_queue_limit() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: String::new(),
            baud: default_baud(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            tick_interval_ms: default_tick_interval_ms(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            tx_queue_limit: default_tx_queue_limit(),
            debug_dump: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            serial: SerialConfig::default(),
            gateway: GatewayConfig::default(),
            logging: LoggingConfig::default(),
            nodes: Vec::new(),
        }
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Invalid config file: {}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Write a commented starter configuration.
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config {
            serial: SerialConfig {
                port: "/dev/ttyUSB0".to_string(),
                baud: default_baud(),
            },
            ..Config::default()
        };
        let content = toml::to_string_pretty(&config)?;
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_BAUDS.contains(&self.serial.baud) {
            return Err(anyhow!(
                "Unsupported baud rate {} (expected one of {:?})",
                self.serial.baud,
                SUPPORTED_BAUDS
            ));
        }
        if self.gateway.tick_interval_ms == 0 {
            return Err(anyhow!("tick_interval_ms must be non-zero"));
        }
        if self.gateway.discovery_timeout_ms < self.gateway.tick_interval_ms {
            return Err(anyhow!(
                "discovery_timeout_ms must be at least one tick interval"
            ));
        }
        if self.gateway.tx_queue_limit == 0 {
            return Err(anyhow!("tx_queue_limit must be non-zero"));
        }
        for entry in &self.nodes {
            if entry.address().is_none() {
                return Err(anyhow!("Invalid node address '{}'", entry.address));
            }
            if entry.node_id.is_empty() || entry.node_id.len() > MAX_NODE_ID {
                return Err(anyhow!(
                    "Node id '{}' must be 1-{} bytes",
                    entry.node_id,
                    MAX_NODE_ID
                ));
            }
        }
        Ok(())
    }
}
