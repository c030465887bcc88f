//! Pure frame encoding and decoding for the WebSocket broker client
//!
//! Frames are JSON text messages. Outbound fields use the short AMPS
//! header names (`c`, `cid`, `t`, `sub_id`, `bm`, `opts`); inbound frames
//! carry `c`, `sub_id` (or `query_id`), `k`, `t`, `d`, `status`, `reason`.

use super::connection::ConnectionError;
use crate::protocol::{BrokerCommand, InboundMessage, MessageKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

#[derive(Debug, Serialize)]
struct OutboundFrame<'a> {
    c: &'a str,
    cid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    t: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    orderby: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bm: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    opts: Option<&'a str>,
}

impl<'a> OutboundFrame<'a> {
    fn bare(c: &'a str, cid: &'a str) -> Self {
        Self {
            c,
            cid,
            client_name: None,
            t: None,
            sub_id: None,
            filter: None,
            orderby: None,
            bm: None,
            opts: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    c: String,
    #[serde(default, alias = "query_id")]
    sub_id: Option<String>,
    #[serde(default)]
    k: Option<String>,
    #[serde(default)]
    t: Option<String>,
    #[serde(default)]
    d: Option<Value>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Routing decision for one raw WebSocket message
#[derive(Debug, Clone, PartialEq)]
pub enum FrameRoute {
    Text(String),
    Closed(String),
    /// Control or empty frames the reader skips
    Ignored,
}

pub struct MessageHandler;

impl MessageHandler {
    pub fn encode_logon(command_id: &str, client_name: &str) -> Result<String, ConnectionError> {
        let mut frame = OutboundFrame::bare("logon", command_id);
        frame.client_name = Some(client_name);
        serde_json::to_string(&frame).map_err(ConnectionError::Serialization)
    }

    /// Commands use their command id as both `cid` and `sub_id`
    pub fn encode_command(command: &BrokerCommand) -> Result<String, ConnectionError> {
        let frame = OutboundFrame {
            c: command.kind.wire_name(),
            cid: &command.command_id,
            client_name: None,
            t: Some(&command.topic),
            sub_id: Some(&command.command_id),
            filter: command.filter.as_deref(),
            orderby: command.order_by.as_deref(),
            bm: command.bookmark.as_deref(),
            opts: Some(&command.options),
        };
        serde_json::to_string(&frame).map_err(ConnectionError::Serialization)
    }

    pub fn encode_unsubscribe(command_id: &str, sub_id: &str) -> Result<String, ConnectionError> {
        let mut frame = OutboundFrame::bare("unsubscribe", command_id);
        frame.sub_id = Some(sub_id);
        serde_json::to_string(&frame).map_err(ConnectionError::Serialization)
    }

    pub fn decode_frame(text: &str) -> Result<InboundMessage, String> {
        let frame: InboundFrame =
            serde_json::from_str(text).map_err(|e| format!("Failed to parse broker frame: {e}"))?;

        let failed_ack = frame.c == "ack"
            && frame
                .status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("failure"));

        let (kind, data) = if failed_ack || frame.c == "error" {
            let reason = frame
                .reason
                .clone()
                .filter(|r| !r.is_empty())
                .or_else(|| frame.d.as_ref().and_then(error_text));
            let data = reason.map(|r| json!({ "error": r }));
            (MessageKind::Error, data)
        } else {
            (MessageKind::from_wire(&frame.c), frame.d.map(Self::normalize_payload))
        };

        Ok(InboundMessage {
            kind,
            sub_id: frame.sub_id,
            topic: frame.t,
            sow_key: frame.k,
            data,
        })
    }

    /// String payloads holding JSON are parsed; other strings stay as-is
    fn normalize_payload(data: Value) -> Value {
        match data {
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(parsed @ Value::Object(_)) => parsed,
                _ => Value::String(text),
            },
            other => other,
        }
    }

    pub fn route_ws_message(message: Message) -> FrameRoute {
        match message {
            Message::Text(text) => FrameRoute::Text(text),
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => FrameRoute::Text(text),
                Err(_) => {
                    debug!("Skipping non-UTF-8 binary frame");
                    FrameRoute::Ignored
                }
            },
            Message::Close(frame) => FrameRoute::Closed(
                frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "Connection closed by broker".to_string()),
            ),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => FrameRoute::Ignored,
        }
    }
}

fn error_text(data: &Value) -> Option<String> {
    match data {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("error")
            .or_else(|| map.get("reason"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
