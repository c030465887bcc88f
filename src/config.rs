//! Console configuration
//!
//! Loaded from a TOML file. Every section is optional; a missing
//! `[[servers]]` list falls back to the two built-in development brokers.

use crate::transport::websocket::connection::{websocket_url, ConnectionError, ReconnectConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Paths tried, in order, when no config file is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["amps-console.toml", "config/amps-console.toml"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleConfig {
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub connection: ConnectionSection,
    #[serde(default)]
    pub grid: GridSection,
}

/// One AMPS broker the console can connect to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            tcp_port: default_tcp_port(),
            websocket_port: default_websocket_port(),
            admin_port: default_admin_port(),
        }
    }

    pub fn with_websocket_port(mut self, port: u16) -> Self {
        self.websocket_port = port;
        self
    }

    pub fn with_admin_port(mut self, port: u16) -> Self {
        self.admin_port = port;
        self
    }

    pub fn websocket_url(&self, message_format: &str) -> Result<Url, ConnectionError> {
        websocket_url(&self.host, self.websocket_port, message_format)
    }

    pub fn admin_url(&self) -> String {
        format!("http://{}:{}", self.host, self.admin_port)
    }

    pub fn config_url(&self) -> String {
        format!("{}/amps/instance/config.xml", self.admin_url())
    }
}

fn default_tcp_port() -> u16 {
    9007
}

fn default_websocket_port() -> u16 {
    9008
}

fn default_admin_port() -> u16 {
    8085
}

fn default_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig::new("Google Cloud AMPS (Dev)", "34.68.65.149"),
        ServerConfig::new("Google Cloud AMPS (Dev 2)", "34.68.65.150"),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSection {
    #[serde(default = "default_message_format")]
    pub default_message_format: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Polling bridge interval
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            default_message_format: default_message_format(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            connect_timeout_secs: default_connect_timeout_secs(),
            sync_interval_ms: default_sync_interval_ms(),
        }
    }
}

fn default_message_format() -> String {
    "json".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_sync_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridSection {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for GridSection {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    100
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Unknown server: {0}")]
    UnknownServer(String),
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            connection: ConnectionSection::default(),
            grid: GridSection::default(),
        }
    }
}

impl ConsoleConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ConsoleConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "at least one [[servers]] entry is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() {
                return Err(ConfigError::InvalidConfig("server name must not be empty".to_string()));
            }
            if server.host.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "server '{}' has an empty host",
                    server.name
                )));
            }
            if !names.insert(server.name.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "duplicate server name '{}'",
                    server.name
                )));
            }
            if server.tcp_port == 0 || server.websocket_port == 0 || server.admin_port == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "server '{}' has a zero port",
                    server.name
                )));
            }
        }

        let conn = &self.connection;
        if conn.default_message_format.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "default_message_format must not be empty".to_string(),
            ));
        }
        if conn.max_reconnect_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_reconnect_attempts must be greater than 0".to_string(),
            ));
        }
        if conn.reconnect_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect_delay_ms must be greater than 0".to_string(),
            ));
        }
        if conn.sync_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "sync_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.grid.page_size == 0 {
            return Err(ConfigError::InvalidConfig("page_size must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Exact name match first, then case-insensitive
    pub fn find_server(&self, name: &str) -> Result<&ServerConfig, ConfigError> {
        self.servers
            .iter()
            .find(|s| s.name == name)
            .or_else(|| self.servers.iter().find(|s| s.name.eq_ignore_ascii_case(name)))
            .ok_or_else(|| ConfigError::UnknownServer(name.to_string()))
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig::from_settings(&self.connection)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.connect_timeout_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.connection.sync_interval_ms)
    }
}
