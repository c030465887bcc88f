//! Execution state machine
//!
//! `Idle → AwaitingGroupEnd → Complete` for queries,
//! `Idle → AwaitingGroupEnd → LiveActive` for query+subscribe,
//! `Idle → LiveActive` for subscribe and `Idle → AwaitingStats → Complete`
//! for stats. `is_executing` is derived from the phase and never stored.

use crate::protocol::CommandKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Idle,
    AwaitingGroupEnd,
    Complete,
    LiveActive,
    AwaitingStats,
}

impl ExecutionPhase {
    pub fn is_executing(&self) -> bool {
        matches!(
            self,
            ExecutionPhase::AwaitingGroupEnd | ExecutionPhase::LiveActive | ExecutionPhase::AwaitingStats
        )
    }
}

/// A live subscription as shown to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionSummary {
    pub id: String,
    pub topic: String,
    pub command: CommandKind,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSnapshot {
    pub is_executing: bool,
    pub phase: ExecutionPhase,
    pub command: Option<CommandKind>,
    pub active_subscriptions: Vec<SubscriptionSummary>,
    pub error: Option<String>,
    pub last_executed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ExecutionStateMachine {
    phase: ExecutionPhase,
    command: Option<CommandKind>,
    active: Vec<SubscriptionSummary>,
    error: Option<String>,
    last_executed: Option<DateTime<Utc>>,
}

impl Default for ExecutionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionStateMachine {
    pub fn new() -> Self {
        Self {
            phase: ExecutionPhase::Idle,
            command: None,
            active: Vec::new(),
            error: None,
            last_executed: None,
        }
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    pub fn is_executing(&self) -> bool {
        self.phase.is_executing()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn last_executed(&self) -> Option<DateTime<Utc>> {
        self.last_executed
    }

    /// Enter the first phase for `kind`, clearing any previous error
    pub fn begin(&mut self, kind: CommandKind) {
        self.phase = match kind {
            CommandKind::Query | CommandKind::QuerySubscribe => ExecutionPhase::AwaitingGroupEnd,
            CommandKind::Subscribe => ExecutionPhase::LiveActive,
            CommandKind::SowStats => ExecutionPhase::AwaitingStats,
        };
        if kind == CommandKind::Subscribe {
            self.last_executed = Some(Utc::now());
        }
        self.command = Some(kind);
        self.error = None;
        self.active.clear();
        debug!(command = %kind, phase = ?self.phase, "execution started");
    }

    pub fn register_subscription(&mut self, summary: SubscriptionSummary) {
        self.active.retain(|s| s.id != summary.id);
        self.active.push(summary);
    }

    /// Snapshot finished; returns the phase entered, if any
    pub fn on_group_end(&mut self) -> Option<ExecutionPhase> {
        if self.phase != ExecutionPhase::AwaitingGroupEnd {
            return None;
        }
        self.last_executed = Some(Utc::now());
        self.phase = match self.command {
            Some(CommandKind::QuerySubscribe) => ExecutionPhase::LiveActive,
            _ => ExecutionPhase::Complete,
        };
        Some(self.phase)
    }

    /// First stats response; returns whether the execution completed
    pub fn on_stats_response(&mut self) -> bool {
        if self.phase != ExecutionPhase::AwaitingStats {
            return false;
        }
        self.phase = ExecutionPhase::Complete;
        self.last_executed = Some(Utc::now());
        true
    }

    /// End the execution after a failure; `error` is the scalar error to show
    pub fn fail(&mut self, error: Option<String>) {
        self.phase = ExecutionPhase::Idle;
        self.active.clear();
        self.error = error;
    }

    /// Return to idle, keeping the last error and timestamp.
    /// Returns false when already idle with nothing to release.
    pub fn stop(&mut self) -> bool {
        if self.phase == ExecutionPhase::Idle && self.active.is_empty() && self.command.is_none() {
            return false;
        }
        self.phase = ExecutionPhase::Idle;
        self.command = None;
        self.active.clear();
        true
    }

    /// Forget everything, used on disconnect
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            is_executing: self.is_executing(),
            phase: self.phase,
            command: self.command,
            active_subscriptions: self.active.clone(),
            error: self.error.clone(),
            last_executed: self.last_executed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, command: CommandKind) -> SubscriptionSummary {
        SubscriptionSummary {
            id: id.to_string(),
            topic: "market_data".to_string(),
            command,
            filter: None,
        }
    }

    #[test]
    fn test_query_executes_until_group_end() {
        let mut sm = ExecutionStateMachine::new();
        sm.begin(CommandKind::Query);
        assert!(sm.is_executing());
        assert!(sm.last_executed().is_none());

        assert_eq!(sm.on_group_end(), Some(ExecutionPhase::Complete));
        assert!(!sm.is_executing());
        assert!(sm.last_executed().is_some());
    }

    #[test]
    fn test_query_subscribe_goes_live_after_snapshot() {
        let mut sm = ExecutionStateMachine::new();
        sm.begin(CommandKind::QuerySubscribe);
        sm.register_subscription(summary("s1", CommandKind::QuerySubscribe));
        assert_eq!(sm.on_group_end(), Some(ExecutionPhase::LiveActive));
        assert!(sm.is_executing());
        assert_eq!(sm.on_group_end(), None);
    }

    #[test]
    fn test_subscribe_stays_live_until_stop() {
        let mut sm = ExecutionStateMachine::new();
        sm.begin(CommandKind::Subscribe);
        sm.register_subscription(summary("s1", CommandKind::Subscribe));
        assert_eq!(sm.on_group_end(), None);
        assert!(sm.is_executing());

        assert!(sm.stop());
        assert!(!sm.is_executing());
        assert!(sm.snapshot().active_subscriptions.is_empty());
        assert!(!sm.stop(), "second stop is a no-op");
    }

    #[test]
    fn test_stats_completes_on_first_response() {
        let mut sm = ExecutionStateMachine::new();
        sm.begin(CommandKind::SowStats);
        assert_eq!(sm.phase(), ExecutionPhase::AwaitingStats);
        assert!(sm.on_stats_response());
        assert!(!sm.on_stats_response());
        assert_eq!(sm.phase(), ExecutionPhase::Complete);
    }

    #[test]
    fn test_fail_and_begin_clear_error() {
        let mut sm = ExecutionStateMachine::new();
        sm.begin(CommandKind::Subscribe);
        sm.fail(Some("Topic not found".to_string()));
        assert!(!sm.is_executing());
        assert_eq!(sm.error(), Some("Topic not found"));

        sm.begin(CommandKind::Query);
        assert_eq!(sm.error(), None);
    }

    #[test]
    fn test_stop_keeps_error() {
        let mut sm = ExecutionStateMachine::new();
        sm.begin(CommandKind::Query);
        sm.fail(Some("boom".to_string()));
        sm.stop();
        assert_eq!(sm.error(), Some("boom"));

        sm.reset();
        assert_eq!(sm.error(), None);
        assert_eq!(sm.phase(), ExecutionPhase::Idle);
    }
}
