//! Session controller
//!
//! The single owner of console state. Intents (`connect`, `execute_command`,
//! `stop_execution`, ...) arrive as `&mut self` calls; broker traffic arrives
//! through one ordered channel and is applied by [`SessionController::next_event`]
//! or [`SessionController::process_pending`]. Snapshots are published on
//! `watch` channels and only when they changed.

use crate::config::{ConsoleConfig, ServerConfig};
use crate::error::{sanitize_error_message, ConsoleError, ConsoleResult};
use crate::protocol::{CommandKind, InboundMessage, MessageKind, QueryOptions, Row, TopicInfo};
use crate::session::classifier::{classify_detailed, ErrorCategory, FieldErrors};
use crate::session::command_session::CommandSession;
use crate::session::events::{ControllerEvent, Notification};
use crate::session::execution::{ExecutionSnapshot, ExecutionStateMachine};
use crate::session::reconciler::{ReconcileOutcome, RowReconciler};
use crate::transport::manager::{ConnectionManager, ConnectionSnapshot, ReconnectOutcome};
use crate::transport::websocket::connection::ConnectionError;
use crate::transport::{BrokerClient, SubscriptionHandle, TransportEnvelope, TransportEvent};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn, Instrument};

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Enables [`SessionController::debug_info`] and per-message tracing
    pub dev_mode: bool,
    pub sync_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            dev_mode: false,
            sync_interval: Duration::from_millis(1000),
        }
    }
}

/// Row-set as published to the view layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowsSnapshot {
    pub version: u64,
    pub rows: Arc<Vec<Row>>,
}

/// Introspection available only in dev mode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugInfo {
    pub client_name: String,
    pub url: Option<String>,
    pub message_format: Option<String>,
    pub epoch: u64,
    pub session_id: Option<String>,
    pub pending_group_records: usize,
    pub rows: usize,
    pub reconnect_attempts: u32,
}

struct SnapshotPublisher {
    connection: watch::Sender<ConnectionSnapshot>,
    execution: watch::Sender<ExecutionSnapshot>,
    rows: watch::Sender<RowsSnapshot>,
    field_errors: watch::Sender<FieldErrors>,
}

fn publish_if_changed<T: PartialEq>(tx: &watch::Sender<T>, next: T) -> bool {
    tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    })
}

enum Wake {
    Envelope(Option<TransportEnvelope>),
    Reconnect,
    Tick,
}

pub struct SessionController<C: BrokerClient> {
    connection: ConnectionManager<C>,
    events_rx: mpsc::UnboundedReceiver<TransportEnvelope>,
    session: Option<CommandSession>,
    view: RowReconciler,
    rows_version: u64,
    execution: ExecutionStateMachine,
    field_errors: FieldErrors,
    notifications_tx: mpsc::UnboundedSender<Notification>,
    notifications_rx: Option<mpsc::UnboundedReceiver<Notification>>,
    snapshots: SnapshotPublisher,
    options: ControllerOptions,
    sync_interval: Option<Interval>,
    default_format: String,
}

impl<C: BrokerClient> SessionController<C> {
    pub fn new(client: C, config: &ConsoleConfig, options: ControllerOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();
        let connection = ConnectionManager::new(client, config.reconnect_config(), events_tx);
        let execution = ExecutionStateMachine::new();

        let snapshots = SnapshotPublisher {
            connection: watch::channel(connection.snapshot()).0,
            execution: watch::channel(execution.snapshot()).0,
            rows: watch::channel(RowsSnapshot::default()).0,
            field_errors: watch::channel(FieldErrors::new()).0,
        };

        Self {
            connection,
            events_rx,
            session: None,
            view: RowReconciler::new(),
            rows_version: 0,
            execution,
            field_errors: FieldErrors::new(),
            notifications_tx,
            notifications_rx: Some(notifications_rx),
            snapshots,
            options,
            sync_interval: None,
            default_format: config.connection.default_message_format.clone(),
        }
    }

    // ---- snapshots -------------------------------------------------------

    pub fn connection_state(&self) -> ConnectionSnapshot {
        self.connection.snapshot()
    }

    pub fn execution_state(&self) -> ExecutionSnapshot {
        self.execution.snapshot()
    }

    pub fn rows(&self) -> &[Row] {
        self.view.rows().as_slice()
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    pub fn current_session(&self) -> Option<&CommandSession> {
        self.session.as_ref()
    }

    /// Topic and command inputs are locked while an execution is active
    pub fn is_locked(&self) -> bool {
        self.execution.is_executing()
    }

    pub fn is_reconnect_scheduled(&self) -> bool {
        self.connection.reconnect_deadline().is_some()
    }

    pub fn client(&self) -> &C {
        self.connection.client()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshots.connection.subscribe()
    }

    pub fn subscribe_execution(&self) -> watch::Receiver<ExecutionSnapshot> {
        self.snapshots.execution.subscribe()
    }

    pub fn subscribe_rows(&self) -> watch::Receiver<RowsSnapshot> {
        self.snapshots.rows.subscribe()
    }

    pub fn subscribe_field_errors(&self) -> watch::Receiver<FieldErrors> {
        self.snapshots.field_errors.subscribe()
    }

    /// The notification stream; can be taken once
    pub fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<Notification>> {
        self.notifications_rx.take()
    }

    pub fn debug_info(&self) -> Option<DebugInfo> {
        if !self.options.dev_mode {
            return None;
        }
        Some(DebugInfo {
            client_name: self.connection.client().client_name().to_string(),
            url: self.connection.current_url(),
            message_format: self.connection.message_format().map(str::to_string),
            epoch: self.connection.epoch(),
            session_id: self.session.as_ref().map(|s| s.id().to_string()),
            pending_group_records: self.view.pending_len(),
            rows: self.view.rows().len(),
            reconnect_attempts: self.connection.reconnect_attempts(),
        })
    }

    /// Publish every snapshot that changed; returns whether any did
    fn publish(&self) -> bool {
        let published_version = self.snapshots.rows.borrow().version;
        let rows_changed = published_version != self.rows_version
            && publish_if_changed(
                &self.snapshots.rows,
                RowsSnapshot {
                    version: self.rows_version,
                    rows: Arc::new(self.view.rows().as_slice().to_vec()),
                },
            );

        let connection = publish_if_changed(&self.snapshots.connection, self.connection.snapshot());
        let execution = publish_if_changed(&self.snapshots.execution, self.execution.snapshot());
        let field_errors = publish_if_changed(&self.snapshots.field_errors, self.field_errors.clone());
        rows_changed || connection || execution || field_errors
    }

    fn notify(&self, notification: Notification) {
        debug!(title = notification.title(), "notification");
        let _ = self.notifications_tx.send(notification);
    }

    fn rows_changed(&mut self) {
        self.rows_version += 1;
    }

    // ---- intents ---------------------------------------------------------

    pub async fn connect(&mut self, server: &ServerConfig) -> ConsoleResult<()> {
        let format = self.default_format.clone();
        self.connect_with_format(server, &format).await
    }

    pub async fn connect_with_format(&mut self, server: &ServerConfig, message_format: &str) -> ConsoleResult<()> {
        if self.connection.is_connected_to(server, message_format) {
            debug!(server = %server.name, "Already connected");
            return Ok(());
        }
        if self.connection.is_engaged() {
            self.disconnect().await;
        }

        let _ = publish_if_changed(
            &self.snapshots.connection,
            ConnectionSnapshot {
                is_connecting: true,
                server: Some(server.name.clone()),
                ..ConnectionSnapshot::default()
            },
        );
        let result = self
            .connection
            .connect(server, message_format)
            .instrument(crate::broker_span!(server = %server.name, format = message_format))
            .await;
        self.publish();
        match result {
            Ok(_) => {
                info!(server = %server.name, format = message_format, "Connected");
                Ok(())
            }
            Err(e) => {
                error!(server = %server.name, error = %e, "Connect failed");
                Err(ConsoleError::Connection(e))
            }
        }
    }

    /// Tear down the connection, drop the session and rows, reset execution
    pub async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            self.release_session(session).await;
        }
        self.connection.disconnect().await;
        self.view.clear();
        self.rows_changed();
        self.execution.reset();
        self.publish();
    }

    pub async fn execute_command(
        &mut self,
        kind: CommandKind,
        topic: &str,
        options: QueryOptions,
        topic_info: Option<&TopicInfo>,
    ) -> ConsoleResult<SubscriptionHandle> {
        let mut session = CommandSession::new(kind, topic, options)?;

        if !self.connection.is_connected() {
            let err = ConnectionError::NotConnected {
                state: self.connection.status().clone(),
            };
            self.execution.fail(Some("Not connected to AMPS server".to_string()));
            self.publish();
            return Err(ConsoleError::Connection(err));
        }

        let switching_target = match self.session.take() {
            Some(previous) => {
                let switching = !previous.targets(kind, topic);
                self.release_session(previous).await;
                switching
            }
            None => false,
        };
        self.view.discard_group();
        if kind.replaces_rows() || switching_target {
            self.view.clear();
            self.rows_changed();
        }

        self.field_errors.clear();
        self.execution.begin(kind);

        if let Some(info) = topic_info {
            let required = info.message_format();
            if let Err(e) = self.connection.ensure_format(&required).await {
                error!(topic = %session.topic(), format = %required, error = %e, "Format switch failed");
                self.execution.fail(Some(sanitize_error_message(&e.to_string())));
                self.publish();
                return Err(ConsoleError::Connection(e));
            }
        }

        session.bind_epoch(self.connection.epoch());
        let command = session.to_broker_command();
        info!(
            command = %kind,
            topic = %session.topic(),
            cid = %session.id(),
            options = %command.options,
            "Executing command"
        );

        let span = crate::session_span!(cid = %session.id(), topic = %session.topic(), command = %kind);
        match self.connection.client_mut().execute(&command).instrument(span).await {
            Ok(handle) => {
                session.attach_handle(handle.clone());
                if let Some(summary) = session.summary() {
                    self.execution.register_subscription(summary);
                }
                self.session = Some(session);
                self.publish();
                Ok(handle)
            }
            Err(e) => {
                let message = sanitize_error_message(&format!(
                    "Failed to execute {} on {}: {}",
                    kind.label(),
                    session.topic(),
                    e
                ));
                error!(error = %message, "Command dispatch failed");
                self.execution.fail(Some(message));
                self.publish();
                Err(ConsoleError::Connection(e))
            }
        }
    }

    /// Release the live subscription and return to idle; rows are kept
    pub async fn stop_execution(&mut self) {
        if let Some(session) = self.session.take() {
            self.release_session(session).await;
        }
        self.view.discard_group();
        if self.execution.stop() {
            info!("Execution stopped");
        }
        self.publish();
    }

    async fn release_session(&mut self, mut session: CommandSession) {
        let Some(handle) = session.take_handle() else {
            return;
        };
        if !self.connection.is_connected() {
            debug!(handle = %handle, "Connection gone, nothing to unsubscribe");
            return;
        }
        if let Err(e) = self.connection.client_mut().unsubscribe(&handle).await {
            let err = ConsoleError::SubscriptionRelease {
                handle: handle.to_string(),
                message: e.to_string(),
            };
            warn!(error = %err, "Unsubscribe failed");
        } else {
            debug!(handle = %handle, topic = %session.topic(), "Unsubscribed");
        }
    }

    pub fn clear_row_set(&mut self) {
        self.view.clear();
        self.rows_changed();
        self.publish();
    }

    pub fn clear_field_errors(&mut self) {
        if self.field_errors.clear() {
            self.publish();
        }
    }

    pub fn clear_field_error(&mut self, category: ErrorCategory) {
        if self.field_errors.clear_field(category) {
            self.publish();
        }
    }

    // ---- inbound ---------------------------------------------------------

    /// Apply everything already queued, without waiting
    pub fn process_pending(&mut self) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        while let Ok(envelope) = self.events_rx.try_recv() {
            events.push(self.handle_envelope(envelope));
        }
        events
    }

    /// Wait for the next inbound event, reconnect deadline or sync tick
    pub async fn next_event(&mut self) -> ControllerEvent {
        let period = self.options.sync_interval;
        let deadline = self.connection.reconnect_deadline();
        let interval = self.sync_interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        let wake = tokio::select! {
            biased;
            envelope = self.events_rx.recv() => Wake::Envelope(envelope),
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Wake::Reconnect,
            _ = interval.tick() => Wake::Tick,
        };

        match wake {
            Wake::Envelope(Some(envelope)) => self.handle_envelope(envelope),
            Wake::Envelope(None) => ControllerEvent::ChannelClosed,
            Wake::Reconnect => self.run_reconnect_attempt().await,
            Wake::Tick => ControllerEvent::Synced {
                changed: self.sync_tick(),
            },
        }
    }

    pub fn handle_envelope(&mut self, envelope: TransportEnvelope) -> ControllerEvent {
        match envelope.event {
            TransportEvent::Message(message) => self.handle_message(envelope.epoch, message),
            TransportEvent::Closed { reason } => self.handle_connection_closed(envelope.epoch, &reason),
        }
    }

    fn handle_message(&mut self, epoch: u64, message: InboundMessage) -> ControllerEvent {
        let (kind, topic) = match self.session.as_ref() {
            Some(session) if session.accepts(epoch, &message) => {
                (session.kind(), session.topic().to_string())
            }
            Some(_) => {
                debug!(kind = %message.kind, sub_id = ?message.sub_id, "Dropping late message");
                return ControllerEvent::Stale;
            }
            None => {
                debug!(kind = %message.kind, "Dropping message without a session");
                return ControllerEvent::Stale;
            }
        };
        if self.options.dev_mode {
            debug!(kind = %message.kind, sub_id = ?message.sub_id, key = ?message.sow_key, "Inbound message");
        }

        if kind == CommandKind::SowStats && message.kind != MessageKind::Error {
            if !self.execution.on_stats_response() {
                return ControllerEvent::Applied(ReconcileOutcome::Ignored);
            }
            self.notify(Notification::StatsReceived {
                topic,
                payload: message.record(),
            });
            self.publish();
            return ControllerEvent::StatsCompleted;
        }

        let outcome = self.view.apply(&message);
        if outcome.rows_changed() {
            self.rows_changed();
        }
        match &outcome {
            ReconcileOutcome::GroupCompleted { records } => {
                self.execution.on_group_end();
                if kind == CommandKind::Query {
                    info!(topic = %topic, records, "Query completed");
                    self.notify(Notification::QueryCompleted {
                        topic,
                        records: *records,
                    });
                }
            }
            ReconcileOutcome::Error { reason } => self.apply_broker_error(reason),
            live if live.is_live_record() => {
                let first_live = self
                    .session
                    .as_mut()
                    .is_some_and(|session| session.mark_live_record());
                if first_live {
                    info!(topic = %topic, command = %kind, "Live updates flowing");
                    self.notify(Notification::SubscriptionActive {
                        topic,
                        command: kind,
                    });
                }
            }
            _ => {}
        }
        self.publish();
        ControllerEvent::Applied(outcome)
    }

    /// Classify a broker error and end the execution
    fn apply_broker_error(&mut self, raw: &str) {
        // classify the full text; only the stored copy is sanitized and capped
        let classification = classify_detailed(raw);
        let message = sanitize_error_message(raw);
        self.field_errors.record_with(classification, &message);
        let category = classification.category;
        error!(category = %category, error = %message, "Broker error");

        self.execution.fail(match category {
            ErrorCategory::General => Some(message.clone()),
            _ => None,
        });
        // the broker refused the command, so there is nothing to unsubscribe
        self.session = None;
        self.view.discard_group();
        self.notify(Notification::BrokerError { message, category });
    }

    fn handle_connection_closed(&mut self, epoch: u64, reason: &str) -> ControllerEvent {
        let Some(decision) = self.connection.handle_transport_closed(epoch, reason) else {
            return ControllerEvent::Stale;
        };
        self.on_connection_lost(reason);
        ControllerEvent::ConnectionLost(decision)
    }

    fn on_connection_lost(&mut self, reason: &str) {
        if let Some(mut session) = self.session.take() {
            session.take_handle();
        }
        self.view.discard_group();
        if self.execution.is_executing() {
            self.execution.fail(Some(format!("Connection lost: {}", reason)));
        }
        self.notify(Notification::ConnectionLost {
            reason: reason.to_string(),
        });
        self.publish();
    }

    async fn run_reconnect_attempt(&mut self) -> ControllerEvent {
        let outcome = self.connection.attempt_reconnect().await;
        match &outcome {
            ReconnectOutcome::Reconnected { .. } => {
                let server = self
                    .connection
                    .server()
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                self.notify(Notification::Reconnected { server });
            }
            ReconnectOutcome::Abandoned { attempts } => {
                self.notify(Notification::ReconnectAbandoned { attempts: *attempts });
            }
            ReconnectOutcome::RetryScheduled { .. } | ReconnectOutcome::NotScheduled => {}
        }
        self.publish();
        ControllerEvent::Reconnect(outcome)
    }

    /// Polling bridge: detect silent drops and publish changed snapshots
    pub fn sync_tick(&mut self) -> bool {
        if self.connection.poll_client_status().is_some() {
            self.on_connection_lost("Connection dropped");
            return true;
        }
        self.publish()
    }
}
