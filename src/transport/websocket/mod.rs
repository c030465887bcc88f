//! JSON-framed WebSocket broker client
//!
//! Split the same way as the rest of the transport layer:
//!
//! - [`connection`] - connection status, reconnection policy, errors, naming
//! - [`message_handler`] - frame encoding and decoding
//! - [`health_monitor`] - reconnection decisions and state transitions
//! - [`client`] - socket I/O and the reader task

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::WebSocketBrokerClient;
pub use connection::{
    generate_client_name, websocket_url, ConnectionError, ConnectionStatus, ReconnectConfig,
};
pub use health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
pub use message_handler::{FrameRoute, MessageHandler};
