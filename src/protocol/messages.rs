//! Inbound broker messages
//!
//! Every message delivered by a broker client carries a kind string and an
//! optional JSON payload. Rows are plain JSON objects; the broker-assigned
//! SOW key is stored under [`KEY_FIELD`] and is the row's identity.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A single grid row: field name to JSON value
pub type Row = Map<String, Value>;

/// Field carrying the SOW key a row is identified by
pub const KEY_FIELD: &str = "key";

const UNKNOWN_ERROR: &str = "Unknown error occurred";

/// Broker message kinds the reconciler distinguishes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    GroupBegin,
    Sow,
    GroupEnd,
    Oof,
    Publish,
    Error,
    /// Anything else (acks, stats records); handled by the default branch
    Other(String),
}

impl MessageKind {
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "group_begin" => MessageKind::GroupBegin,
            "sow" => MessageKind::Sow,
            "group_end" => MessageKind::GroupEnd,
            "oof" => MessageKind::Oof,
            "publish" | "p" => MessageKind::Publish,
            "error" => MessageKind::Error,
            other => MessageKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::GroupBegin => "group_begin",
            MessageKind::Sow => "sow",
            MessageKind::GroupEnd => "group_end",
            MessageKind::Oof => "oof",
            MessageKind::Publish => "publish",
            MessageKind::Error => "error",
            MessageKind::Other(other) => other,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound message as delivered to the session controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub kind: MessageKind,
    /// Command id the broker correlated this message with, when known
    pub sub_id: Option<String>,
    pub topic: Option<String>,
    pub sow_key: Option<String>,
    pub data: Option<Value>,
}

impl InboundMessage {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            sub_id: None,
            topic: None,
            sow_key: None,
            data: None,
        }
    }

    pub fn group_begin() -> Self {
        Self::new(MessageKind::GroupBegin)
    }

    pub fn group_end() -> Self {
        Self::new(MessageKind::GroupEnd)
    }

    pub fn sow(data: Value) -> Self {
        Self::new(MessageKind::Sow).with_data(data)
    }

    pub fn publish(data: Value) -> Self {
        Self::new(MessageKind::Publish).with_data(data)
    }

    pub fn oof(data: Value) -> Self {
        Self::new(MessageKind::Oof).with_data(data)
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(MessageKind::Error).with_data(serde_json::json!({ "error": reason.into() }))
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_sow_key(mut self, key: impl Into<String>) -> Self {
        self.sow_key = Some(key.into());
        self
    }

    pub fn with_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.sub_id = Some(sub_id.into());
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Payload as a grid row. Non-object payloads are wrapped under
    /// `value`; the SOW key, when present, overrides any `key` field.
    pub fn record(&self) -> Option<Row> {
        let mut row = match self.data.as_ref()? {
            Value::Null => return None,
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Row::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        if let Some(key) = &self.sow_key {
            row.insert(KEY_FIELD.to_string(), Value::String(key.clone()));
        }
        Some(row)
    }

    /// Human-readable reason carried by an error message
    pub fn error_reason(&self) -> String {
        match &self.data {
            Some(Value::String(reason)) if !reason.is_empty() => reason.clone(),
            Some(Value::Object(map)) => ["error", "reason", "message"]
                .iter()
                .find_map(|field| map.get(*field).and_then(Value::as_str))
                .filter(|reason| !reason.is_empty())
                .unwrap_or(UNKNOWN_ERROR)
                .to_string(),
            _ => UNKNOWN_ERROR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_kind_from_wire() {
        assert_eq!(MessageKind::from_wire("group_begin"), MessageKind::GroupBegin);
        assert_eq!(MessageKind::from_wire("p"), MessageKind::Publish);
        assert_eq!(MessageKind::from_wire("publish"), MessageKind::Publish);
        assert_eq!(
            MessageKind::from_wire("ack"),
            MessageKind::Other("ack".to_string())
        );
        assert_eq!(MessageKind::Other("ack".to_string()).as_str(), "ack");
    }

    #[test]
    fn test_record_attaches_sow_key() {
        let msg = InboundMessage::publish(json!({"symbol": "GSK", "key": "stale"}))
            .with_sow_key("GSK");
        let row = msg.record().unwrap();
        assert_eq!(row["key"], json!("GSK"));
        assert_eq!(row["symbol"], json!("GSK"));
    }

    #[test]
    fn test_record_wraps_scalars_and_skips_empty() {
        let msg = InboundMessage::publish(json!(42));
        assert_eq!(msg.record().unwrap()["value"], json!(42));

        assert!(InboundMessage::new(MessageKind::Publish).record().is_none());
        assert!(InboundMessage::publish(Value::Null).record().is_none());
    }

    #[test]
    fn test_error_reason_extraction() {
        assert_eq!(
            InboundMessage::error("bad filter near '='").error_reason(),
            "bad filter near '='"
        );
        assert_eq!(
            InboundMessage::new(MessageKind::Error)
                .with_data(json!("not entitled"))
                .error_reason(),
            "not entitled"
        );
        assert_eq!(
            InboundMessage::new(MessageKind::Error).error_reason(),
            "Unknown error occurred"
        );
    }
}
