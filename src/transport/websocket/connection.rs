//! Pure connection state and configuration for the WebSocket broker client
//!
//! Connection status, reconnection policy, transport errors and the
//! naming helpers (client name, endpoint URL) live here so they can be
//! tested without a socket.

use crate::config::ConnectionSection;
use chrono::Utc;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Longest client name the broker accepts
pub const MAX_CLIENT_NAME_LEN: usize = 64;

/// Connection status tracked by the connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected; carries the last connect error, if any
    Disconnected(Option<String>),
    Connecting,
    Connected,
    /// Waiting for or running reconnection attempt `attempt`
    Reconnecting { attempt: u32, reason: String },
    /// Reconnection bound exceeded; no further attempts are scheduled
    PermanentlyDisconnected(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting | ConnectionStatus::Reconnecting { .. }
        )
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ConnectionStatus::Disconnected(error) => error.as_deref(),
            ConnectionStatus::Reconnecting { reason, .. } => Some(reason),
            ConnectionStatus::PermanentlyDisconnected(reason) => Some(reason),
            ConnectionStatus::Connecting | ConnectionStatus::Connected => None,
        }
    }
}

/// Flat-delay, bounded reconnection policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 3000,
        }
    }
}

impl ReconnectConfig {
    pub fn from_settings(settings: &ConnectionSection) -> Self {
        Self {
            max_attempts: settings.max_reconnect_attempts,
            delay_ms: settings.reconnect_delay_ms,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Worst-case time spent retrying before giving up
    pub fn max_total_time(&self) -> Duration {
        Duration::from_millis(self.delay_ms.saturating_mul(u64::from(self.max_attempts)))
    }
}

/// Transport errors surfaced by broker clients
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionStatus },
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Serialization error")]
    Serialization(#[source] serde_json::Error),
}

/// `ws://{host}:{port}/amps/{format}`, validated
pub fn websocket_url(host: &str, port: u16, message_format: &str) -> Result<Url, ConnectionError> {
    let raw = format!("ws://{}:{}/amps/{}", host, port, message_format);
    let url = Url::parse(&raw).map_err(|_| ConnectionError::InvalidUrl(raw.clone()))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConnectionError::InvalidUrl(raw));
    }
    Ok(url)
}

/// `AMPSConsole_<millis>_<6 random>_<hostname>`, capped at 64 chars
pub fn generate_client_name() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    build_client_name(Utc::now().timestamp_millis(), &host)
}

fn build_client_name(millis: i64, host: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    let sanitized_host: String = host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let mut name = format!("AMPSConsole_{}_{}_{}", millis, &random[..6], sanitized_host);
    name.truncate(MAX_CLIENT_NAME_LEN);
    name
}
