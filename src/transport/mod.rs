//! Broker transport layer
//!
//! [`BrokerClient`] is the seam between the session core and a physical
//! broker connection. Clients push inbound traffic into an [`EventSink`]
//! tagged with the connection epoch, so the controller can drop anything
//! belonging to a connection it has already replaced.
//!
//! # Usage
//!
//! ```rust
//! use amps_console::protocol::InboundMessage;
//! use amps_console::testing::MockBrokerClient;
//! use amps_console::transport::{BrokerClient, EventSink, TransportEvent};
//! use serde_json::json;
//! use tokio::sync::mpsc;
//!
//! # tokio_test::block_on(async {
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let mut client = MockBrokerClient::new();
//! client.connect("ws://localhost:9008/amps/json", EventSink::new(1, tx)).await?;
//!
//! client.push_message(InboundMessage::publish(json!({"id": 1})));
//! let envelope = rx.recv().await.expect("sink is open");
//! assert_eq!(envelope.epoch, 1);
//! assert!(matches!(envelope.event, TransportEvent::Message(_)));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

use crate::protocol::{BrokerCommand, InboundMessage};
use std::fmt;
use tokio::sync::mpsc;

pub mod manager;
pub mod websocket;

pub use manager::{ConnectionManager, ConnectionSnapshot, ReconnectOutcome};
pub use websocket::{ConnectionError, ConnectionStatus, ReconnectConfig, WebSocketBrokerClient};

/// Broker-side handle of a live subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(String);

impl SubscriptionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(InboundMessage),
    /// The connection closed without being asked to
    Closed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportEnvelope {
    pub epoch: u64,
    pub event: TransportEvent,
}

/// Ordered delivery of one connection's events to the controller
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<TransportEnvelope>,
}

impl EventSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<TransportEnvelope>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns false once the controller has gone away
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TransportEnvelope {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }

    pub fn message(&self, message: InboundMessage) -> bool {
        self.emit(TransportEvent::Message(message))
    }

    pub fn closed(&self, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::Closed {
            reason: reason.into(),
        })
    }
}

/// Physical broker connection used by the connection manager
///
/// Implementations own at most one connection at a time. `connect` on an
/// already connected client replaces the connection.
#[async_trait::async_trait]
pub trait BrokerClient: Send {
    /// Open a connection to `url`, delivering inbound traffic to `sink`
    async fn connect(&mut self, url: &str, sink: EventSink) -> Result<(), ConnectionError>;

    /// Close the connection; must not report a `Closed` event
    async fn disconnect(&mut self) -> Result<(), ConnectionError>;

    /// Dispatch a command and return its handle
    async fn execute(&mut self, command: &BrokerCommand) -> Result<SubscriptionHandle, ConnectionError>;

    /// Cancel a live subscription
    async fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> Result<(), ConnectionError>;

    fn is_connected(&self) -> bool;

    fn client_name(&self) -> &str;
}
