//! Client Configuration
//!
//! Configuration for `ledgerctl` and library callers that prefer a file over
//! building `Timeouts` by hand. Every section is optional.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::network::discovery::{DEFAULT_DISCOVERY_URL, DEFAULT_PEER_PORT};
use crate::network::Timeouts;

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Request deadlines
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Peer discovery service
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Deadlines, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,

    #[serde(default = "default_write_ms")]
    pub write_ms: u64,

    /// Applies to each response field separately
    #[serde(default = "default_read_ms")]
    pub read_ms: u64,
}

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Discovery service URL
    #[serde(default = "default_discovery_url")]
    pub url: String,

    /// Port used for every discovered host
    #[serde(default = "default_peer_port")]
    pub peer_port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_connect_ms() -> u64 {
    5000
}

fn default_write_ms() -> u64 {
    5000
}

fn default_read_ms() -> u64 {
    10000
}

fn default_discovery_url() -> String {
    DEFAULT_DISCOVERY_URL.to_string()
}

fn default_peer_port() -> u16 {
    DEFAULT_PEER_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            write_ms: default_write_ms(),
            read_ms: default_read_ms(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            url: default_discovery_url(),
            peer_port: default_peer_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        let t = &self.timeouts;
        if t.connect_ms == 0 || t.write_ms == 0 || t.read_ms == 0 {
            return Err(crate::Error::Config("timeouts must be greater than zero".into()));
        }

        if self.discovery.url.is_empty() {
            return Err(crate::Error::Config("discovery.url cannot be empty".into()));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.connect_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.write_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.read_ms)
    }

    /// Deadlines for `NodeClient`
    pub fn client_timeouts(&self) -> Timeouts {
        Timeouts {
            connect: self.connect_timeout(),
            write: self.write_timeout(),
            read: self.read_timeout(),
        }
    }
}
