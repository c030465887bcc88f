//! Row reconciliation
//!
//! Applies broker messages to the visible row-set. Snapshot records are
//! buffered between `group_begin` and `group_end` and become visible in one
//! step; live records merge into the row with the same key or append.

use crate::protocol::{InboundMessage, MessageKind, Row, KEY_FIELD};
use serde_json::Value;
use tracing::{debug, warn};

/// Two rows match iff both carry a non-null `key` and the values are equal
pub fn rows_match(a: &Row, b: &Row) -> bool {
    match (key_of(a), key_of(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn key_of(row: &Row) -> Option<&Value> {
    row.get(KEY_FIELD).filter(|v| !v.is_null())
}

/// Where an upserted row ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Merged(usize),
    Appended(usize),
}

/// Ordered, key-deduplicated rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    rows: Vec<Row>,
}

impl RowSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn as_slice(&self) -> &[Row] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn replace(&mut self, rows: Vec<Row>) {
        self.rows = rows;
    }

    pub fn position(&self, row: &Row) -> Option<usize> {
        self.rows.iter().position(|existing| rows_match(existing, row))
    }

    /// Shallow-merge into the matching row, or append
    pub fn upsert(&mut self, row: Row) -> Upsert {
        match self.position(&row) {
            Some(index) => {
                self.rows[index].extend(row);
                Upsert::Merged(index)
            }
            None => {
                self.rows.push(row);
                Upsert::Appended(self.rows.len() - 1)
            }
        }
    }

    /// Remove the row matching `row`'s key; returns whether one was removed
    pub fn remove_matching(&mut self, row: &Row) -> bool {
        match self.position(row) {
            Some(index) => {
                self.rows.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Effect of applying one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    GroupStarted,
    Buffered { pending: usize },
    GroupCompleted { records: usize },
    Removed { removed: bool },
    Merged { index: usize },
    Appended { index: usize },
    Error { reason: String },
    Ignored,
}

impl ReconcileOutcome {
    /// Whether the visible row-set changed
    pub fn rows_changed(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::GroupCompleted { .. }
                | ReconcileOutcome::Removed { removed: true }
                | ReconcileOutcome::Merged { .. }
                | ReconcileOutcome::Appended { .. }
        )
    }

    /// Whether a live record landed in the row-set
    pub fn is_live_record(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Merged { .. } | ReconcileOutcome::Appended { .. }
        )
    }
}

/// Row-set plus the in-flight snapshot buffer
#[derive(Debug, Default)]
pub struct RowReconciler {
    rows: RowSet,
    group: Option<Vec<Row>>,
}

impl RowReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &RowSet {
        &self.rows
    }

    pub fn is_grouping(&self) -> bool {
        self.group.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.group.as_ref().map_or(0, Vec::len)
    }

    /// Clear visible rows and any pending snapshot
    pub fn clear(&mut self) {
        self.rows.clear();
        self.group = None;
    }

    pub fn discard_group(&mut self) {
        self.group = None;
    }

    pub fn apply(&mut self, message: &InboundMessage) -> ReconcileOutcome {
        match &message.kind {
            MessageKind::GroupBegin => {
                if self.group.is_some() {
                    debug!("group_begin while a group is open, restarting buffer");
                }
                self.group = Some(Vec::new());
                ReconcileOutcome::GroupStarted
            }
            MessageKind::Sow => {
                let Some(row) = message.record() else {
                    warn!("sow message without data");
                    return ReconcileOutcome::Ignored;
                };
                let group = self.group.get_or_insert_with(Vec::new);
                group.push(row);
                ReconcileOutcome::Buffered {
                    pending: group.len(),
                }
            }
            MessageKind::GroupEnd => {
                let records = self.group.take().unwrap_or_default();
                let count = records.len();
                self.rows.replace(records);
                ReconcileOutcome::GroupCompleted { records: count }
            }
            MessageKind::Oof => match message.record() {
                Some(row) => ReconcileOutcome::Removed {
                    removed: self.rows.remove_matching(&row),
                },
                None => ReconcileOutcome::Removed { removed: false },
            },
            MessageKind::Error => ReconcileOutcome::Error {
                reason: message.error_reason(),
            },
            MessageKind::Publish | MessageKind::Other(_) => match message.record() {
                Some(row) => match self.rows.upsert(row) {
                    Upsert::Merged(index) => ReconcileOutcome::Merged { index },
                    Upsert::Appended(index) => ReconcileOutcome::Appended { index },
                },
                None => ReconcileOutcome::Ignored,
            },
        }
    }
}
