//! Pure reconnection decisions and connection state transitions

use super::connection::{ConnectionStatus, ReconnectConfig};
use tracing::{error, info, warn};

pub struct HealthMonitor;

impl HealthMonitor {
    /// Decide whether another reconnection attempt should be scheduled.
    /// `current_attempts` counts attempts already made for this outage.
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        config: &ReconnectConfig,
        user_initiated: bool,
    ) -> ReconnectionDecision {
        if user_initiated {
            return ReconnectionDecision::AbortUserDisconnect;
        }
        if current_attempts >= config.max_attempts {
            return ReconnectionDecision::AbortMaxAttemptsExceeded {
                attempts: current_attempts,
            };
        }
        ReconnectionDecision::Proceed {
            attempt: current_attempts + 1,
            delay_ms: config.delay_ms,
        }
    }

    pub fn determine_next_state(event: ConnectionEvent) -> ConnectionStatus {
        match event {
            ConnectionEvent::ConnectStarted => ConnectionStatus::Connecting,
            ConnectionEvent::Established => ConnectionStatus::Connected,
            ConnectionEvent::ConnectFailed(error) => ConnectionStatus::Disconnected(Some(error)),
            ConnectionEvent::DisconnectedByUser => ConnectionStatus::Disconnected(None),
            ConnectionEvent::ReconnectionScheduled { attempt, reason } => {
                ConnectionStatus::Reconnecting { attempt, reason }
            }
            ConnectionEvent::PermanentFailure(reason) => {
                ConnectionStatus::PermanentlyDisconnected(reason)
            }
        }
    }

    /// Commands may only be dispatched on an established connection
    pub fn can_execute(status: &ConnectionStatus) -> bool {
        status.is_connected()
    }

    pub fn log_state_transition(from: &ConnectionStatus, to: &ConnectionStatus) {
        match (from, to) {
            (ConnectionStatus::Connecting, ConnectionStatus::Connected) => {
                info!("Broker connection established");
            }
            (ConnectionStatus::Reconnecting { attempt, .. }, ConnectionStatus::Connected) => {
                info!(attempt, "Reconnection successful");
            }
            (ConnectionStatus::Connected, ConnectionStatus::Reconnecting { attempt, reason }) => {
                warn!(attempt, reason = %reason, "Broker connection lost, reconnect scheduled");
            }
            (_, ConnectionStatus::Reconnecting { attempt, reason }) => {
                warn!(attempt, reason = %reason, "Reconnection attempt failed, retrying");
            }
            (_, ConnectionStatus::PermanentlyDisconnected(reason)) => {
                error!(reason = %reason, "Giving up on broker connection");
            }
            (_, ConnectionStatus::Disconnected(Some(error))) => {
                warn!(error = %error, "Broker connection failed");
            }
            (_, ConnectionStatus::Disconnected(None)) => {
                info!("Disconnected from broker");
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectionDecision {
    Proceed { attempt: u32, delay_ms: u64 },
    AbortUserDisconnect,
    AbortMaxAttemptsExceeded { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectStarted,
    Established,
    ConnectFailed(String),
    DisconnectedByUser,
    ReconnectionScheduled { attempt: u32, reason: String },
    PermanentFailure(String),
}
