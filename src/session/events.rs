//! Notifications for the view layer and controller pump results

use crate::protocol::{CommandKind, Row};
use crate::session::classifier::ErrorCategory;
use crate::session::reconciler::ReconcileOutcome;
use crate::transport::manager::ReconnectOutcome;
use crate::transport::websocket::health_monitor::ReconnectionDecision;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Toast-style messages emitted by the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    QueryCompleted { topic: String, records: usize },
    SubscriptionActive { topic: String, command: CommandKind },
    StatsReceived { topic: String, payload: Option<Row> },
    BrokerError { message: String, category: ErrorCategory },
    ConnectionLost { reason: String },
    Reconnected { server: String },
    ReconnectAbandoned { attempts: u32 },
}

impl Notification {
    pub fn title(&self) -> &'static str {
        match self {
            Notification::QueryCompleted { .. } => "Query Completed",
            Notification::SubscriptionActive { command, .. } => match command {
                CommandKind::QuerySubscribe => "Query + Subscription Active",
                _ => "Subscription Active",
            },
            Notification::StatsReceived { .. } => "Stats Received",
            Notification::BrokerError { .. } => "AMPS Error",
            Notification::ConnectionLost { .. } => "Connection Lost",
            Notification::Reconnected { .. } => "Reconnected",
            Notification::ReconnectAbandoned { .. } => "Reconnect Failed",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notification::QueryCompleted { topic, records } => {
                format!("Retrieved {} records from {}", records, topic)
            }
            Notification::SubscriptionActive { topic, .. } => {
                format!("Receiving live updates from {}", topic)
            }
            Notification::StatsReceived { topic, .. } => format!("SOW statistics for {}", topic),
            Notification::BrokerError { message, .. } => message.clone(),
            Notification::ConnectionLost { reason } => reason.clone(),
            Notification::Reconnected { server } => format!("Connection to {} restored", server),
            Notification::ReconnectAbandoned { attempts } => {
                format!("Gave up after {} reconnection attempts", attempts)
            }
        }
    }

    pub fn level(&self) -> NotificationLevel {
        match self {
            Notification::QueryCompleted { .. }
            | Notification::SubscriptionActive { .. }
            | Notification::Reconnected { .. } => NotificationLevel::Success,
            Notification::StatsReceived { .. } => NotificationLevel::Info,
            Notification::ConnectionLost { .. } => NotificationLevel::Warning,
            Notification::BrokerError { .. } | Notification::ReconnectAbandoned { .. } => {
                NotificationLevel::Error
            }
        }
    }
}

/// What one pump of the controller did
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    Applied(ReconcileOutcome),
    StatsCompleted,
    /// Message or closure for a released session or superseded connection
    Stale,
    ConnectionLost(ReconnectionDecision),
    Reconnect(ReconnectOutcome),
    Synced { changed: bool },
    /// The transport channel closed; no further events will arrive
    ChannelClosed,
}
