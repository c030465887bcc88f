//! Command sessions and the message-stream reconciliation core
//!
//! - [`reconciler`] - row-set maintenance per message kind
//! - [`classifier`] - broker error to field attribution
//! - [`execution`] - execution phases and activity flags
//! - [`command_session`] - the single in-flight operation
//! - [`controller`] - owner of all of the above plus the connection

pub mod classifier;
pub mod command_session;
pub mod controller;
pub mod events;
pub mod execution;
pub mod reconciler;

pub use classifier::{classify, ErrorCategory, FieldErrors};
pub use command_session::{generate_command_id, CommandSession};
pub use controller::{ControllerOptions, DebugInfo, RowsSnapshot, SessionController};
pub use events::{ControllerEvent, Notification, NotificationLevel};
pub use execution::{ExecutionPhase, ExecutionSnapshot, ExecutionStateMachine, SubscriptionSummary};
pub use reconciler::{rows_match, ReconcileOutcome, RowReconciler, RowSet};
