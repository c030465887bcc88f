//! AMPS Console - operator console core for AMPS pub/sub brokers
//!
//! # Overview
//!
//! This crate holds everything an operator console needs below the view layer:
//! - Broker connection management over WebSocket with bounded reconnection
//! - Command sessions for SOW queries, subscriptions and SOW statistics
//! - Row-set reconciliation of the inbound message stream
//! - Broker error attribution to the query options that caused it
//! - Topic discovery through the broker's admin interface
//! - Grid helpers for column ordering, quick filtering, paging and export
//!
//! # Quick Start
//!
//! ```rust
//! use amps_console::protocol::InboundMessage;
//! use amps_console::session::RowReconciler;
//! use serde_json::json;
//!
//! let mut view = RowReconciler::new();
//!
//! // SOW results are buffered until the group ends
//! view.apply(&InboundMessage::group_begin());
//! view.apply(&InboundMessage::sow(json!({"qty": 10})).with_sow_key("1"));
//! view.apply(&InboundMessage::group_end());
//!
//! // live publishes merge into the row with the same key
//! view.apply(&InboundMessage::publish(json!({"qty": 12})).with_sow_key("1"));
//!
//! assert_eq!(view.rows().len(), 1);
//! assert_eq!(view.rows().as_slice()[0]["qty"], 12);
//! ```

pub mod admin;
pub mod config;
pub mod error;
pub mod grid;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, ConsoleConfig, ServerConfig};
pub use error::{ConsoleError, ConsoleResult};
pub use protocol::*;
pub use session::{ControllerEvent, Notification, SessionController};
pub use transport::{BrokerClient, WebSocketBrokerClient};
