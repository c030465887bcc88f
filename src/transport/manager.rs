//! Connection manager
//!
//! Owns the single physical broker connection: which server and message
//! format it points at, its status, and the reconnection schedule after an
//! unexpected closure. Each (re)connect bumps an epoch; events tagged with
//! an older epoch belong to a connection that no longer exists.

use super::websocket::connection::{ConnectionError, ConnectionStatus, ReconnectConfig};
use super::websocket::health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
use super::{BrokerClient, EventSink, TransportEnvelope};
use crate::config::ServerConfig;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Connection state as shown to the view layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub is_connected: bool,
    pub is_connecting: bool,
    pub error: Option<String>,
    pub server: Option<String>,
    pub message_format: Option<String>,
}

/// Result of one scheduled reconnection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    Reconnected { attempt: u32 },
    RetryScheduled { attempt: u32 },
    Abandoned { attempts: u32 },
    NotScheduled,
}

pub struct ConnectionManager<C: BrokerClient> {
    client: C,
    status: ConnectionStatus,
    server: Option<ServerConfig>,
    message_format: Option<String>,
    reconnect_config: ReconnectConfig,
    reconnect_attempts: u32,
    reconnect_deadline: Option<Instant>,
    epoch: u64,
    events_tx: mpsc::UnboundedSender<TransportEnvelope>,
}

impl<C: BrokerClient> ConnectionManager<C> {
    pub fn new(
        client: C,
        reconnect_config: ReconnectConfig,
        events_tx: mpsc::UnboundedSender<TransportEnvelope>,
    ) -> Self {
        Self {
            client,
            status: ConnectionStatus::Disconnected(None),
            server: None,
            message_format: None,
            reconnect_config,
            reconnect_attempts: 0,
            reconnect_deadline: None,
            epoch: 0,
            events_tx,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn server(&self) -> Option<&ServerConfig> {
        self.server.as_ref()
    }

    pub fn message_format(&self) -> Option<&str> {
        self.message_format.as_deref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_connected(&self) -> bool {
        HealthMonitor::can_execute(&self.status)
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_deadline
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn current_url(&self) -> Option<String> {
        let server = self.server.as_ref()?;
        let format = self.message_format.as_deref()?;
        server.websocket_url(format).ok().map(|u| u.to_string())
    }

    pub fn is_connected_to(&self, server: &ServerConfig, message_format: &str) -> bool {
        self.is_connected()
            && self.server.as_ref().is_some_and(|s| s == server)
            && self.message_format.as_deref() == Some(message_format)
    }

    /// True while the manager holds (or is trying to restore) a connection
    pub fn is_engaged(&self) -> bool {
        self.server.is_some() || !matches!(self.status, ConnectionStatus::Disconnected(_))
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            is_connected: self.status.is_connected(),
            is_connecting: self.status.is_connecting(),
            error: self.status.error().map(str::to_string),
            server: self.server.as_ref().map(|s| s.name.clone()),
            message_format: self.message_format.clone(),
        }
    }

    fn transition(&mut self, event: ConnectionEvent) {
        let next = HealthMonitor::determine_next_state(event);
        HealthMonitor::log_state_transition(&self.status, &next);
        self.status = next;
    }

    /// Connect to `server` using `message_format`.
    /// Returns `Ok(false)` when already connected to that endpoint.
    pub async fn connect(
        &mut self,
        server: &ServerConfig,
        message_format: &str,
    ) -> Result<bool, ConnectionError> {
        if self.is_connected_to(server, message_format) {
            debug!(server = %server.name, format = message_format, "Already connected");
            return Ok(false);
        }
        if self.is_engaged() {
            self.teardown().await;
        }

        self.transition(ConnectionEvent::ConnectStarted);
        match self.open(server, message_format).await {
            Ok(()) => {
                self.server = Some(server.clone());
                self.message_format = Some(message_format.to_string());
                self.reconnect_attempts = 0;
                self.transition(ConnectionEvent::Established);
                Ok(true)
            }
            Err(e) => {
                self.server = None;
                self.message_format = None;
                self.transition(ConnectionEvent::ConnectFailed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn open(&mut self, server: &ServerConfig, message_format: &str) -> Result<(), ConnectionError> {
        let url = server.websocket_url(message_format)?;
        self.epoch += 1;
        let sink = EventSink::new(self.epoch, self.events_tx.clone());
        info!(server = %server.name, url = %url, epoch = self.epoch, "Connecting to broker");
        self.client.connect(url.as_str(), sink).await
    }

    /// Close the transport without touching the status
    async fn teardown(&mut self) {
        self.reconnect_deadline = None;
        self.epoch += 1;
        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "Error while closing broker connection");
        }
    }

    /// User-initiated disconnect; never fails and never reconnects
    pub async fn disconnect(&mut self) {
        self.teardown().await;
        self.reconnect_attempts = 0;
        self.server = None;
        self.message_format = None;
        self.transition(ConnectionEvent::DisconnectedByUser);
    }

    /// Reconnect to the current server if `message_format` differs.
    /// Returns whether a switch happened.
    pub async fn ensure_format(&mut self, message_format: &str) -> Result<bool, ConnectionError> {
        let server = match (&self.server, self.is_connected()) {
            (Some(server), true) => server.clone(),
            _ => {
                return Err(ConnectionError::NotConnected {
                    state: self.status.clone(),
                })
            }
        };
        if self.message_format.as_deref() == Some(message_format) {
            return Ok(false);
        }
        info!(
            server = %server.name,
            from = ?self.message_format,
            to = message_format,
            "Switching message format"
        );
        self.connect(&server, message_format).await?;
        Ok(true)
    }

    /// Handle an unexpected closure reported by the client.
    /// Returns `None` for closures of superseded connections.
    pub fn handle_transport_closed(&mut self, epoch: u64, reason: &str) -> Option<ReconnectionDecision> {
        if epoch != self.epoch || !self.status.is_connected() {
            debug!(epoch, current = self.epoch, "Ignoring stale connection closure");
            return None;
        }
        self.reconnect_attempts = 0;
        info!(
            reason,
            max_attempts = self.reconnect_config.max_attempts,
            max_wait = ?self.reconnect_config.max_total_time(),
            "Connection lost, scheduling reconnection"
        );
        Some(self.schedule_reconnect(reason))
    }

    fn schedule_reconnect(&mut self, reason: &str) -> ReconnectionDecision {
        let decision =
            HealthMonitor::should_attempt_reconnection(self.reconnect_attempts, &self.reconnect_config, false);
        match &decision {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                self.reconnect_deadline = Some(Instant::now() + std::time::Duration::from_millis(*delay_ms));
                self.transition(ConnectionEvent::ReconnectionScheduled {
                    attempt: *attempt,
                    reason: reason.to_string(),
                });
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded { attempts } => {
                self.reconnect_deadline = None;
                self.transition(ConnectionEvent::PermanentFailure(format!(
                    "Max reconnection attempts ({}) exceeded: {}",
                    attempts, reason
                )));
            }
            ReconnectionDecision::AbortUserDisconnect => {
                self.reconnect_deadline = None;
            }
        }
        decision
    }

    /// Run the scheduled reconnection attempt
    pub async fn attempt_reconnect(&mut self) -> ReconnectOutcome {
        if self.reconnect_deadline.take().is_none() {
            return ReconnectOutcome::NotScheduled;
        }
        let (Some(server), Some(format)) = (self.server.clone(), self.message_format.clone()) else {
            return ReconnectOutcome::NotScheduled;
        };

        self.reconnect_attempts += 1;
        let attempt = self.reconnect_attempts;
        info!(attempt, server = %server.name, "Attempting reconnection");

        match self.open(&server, &format).await {
            Ok(()) => {
                self.reconnect_attempts = 0;
                self.transition(ConnectionEvent::Established);
                ReconnectOutcome::Reconnected { attempt }
            }
            Err(e) => match self.schedule_reconnect(&e.to_string()) {
                ReconnectionDecision::Proceed { attempt, .. } => ReconnectOutcome::RetryScheduled { attempt },
                _ => ReconnectOutcome::Abandoned { attempts: attempt },
            },
        }
    }

    /// Reconcile cached status with what the client reports.
    /// Returns a decision when a silent drop was detected.
    pub fn poll_client_status(&mut self) -> Option<ReconnectionDecision> {
        if self.status.is_connected() && !self.client.is_connected() {
            let epoch = self.epoch;
            return self.handle_transport_closed(epoch, "Connection dropped");
        }
        None
    }
}
