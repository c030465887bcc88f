//! One in-flight logical operation bound to a topic and query options

use crate::error::ConsoleError;
use crate::protocol::{BrokerCommand, CommandKind, InboundMessage, QueryOptions};
use crate::session::execution::SubscriptionSummary;
use crate::transport::SubscriptionHandle;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Prefix of every generated command id
pub const COMMAND_ID_PREFIX: &str = "amps_sub_";

/// `amps_sub_<epoch-millis>_<9 random chars>`
pub fn generate_command_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let random = Uuid::new_v4().simple().to_string();
    format!("{}{}_{}", COMMAND_ID_PREFIX, millis, &random[..9])
}

#[derive(Debug, Clone)]
pub struct CommandSession {
    id: String,
    kind: CommandKind,
    topic: String,
    options: QueryOptions,
    epoch: u64,
    handle: Option<SubscriptionHandle>,
    live_announced: bool,
    started_at: DateTime<Utc>,
}

impl CommandSession {
    /// Validate and create a session; nothing is dispatched yet
    pub fn new(kind: CommandKind, topic: &str, options: QueryOptions) -> Result<Self, ConsoleError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ConsoleError::InvalidCommand {
                message: "Topic is required".to_string(),
            });
        }
        Ok(Self {
            id: generate_command_id(),
            kind,
            topic: topic.to_string(),
            options,
            epoch: 0,
            handle: None,
            live_announced: false,
            started_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn handle(&self) -> Option<&SubscriptionHandle> {
        self.handle.as_ref()
    }

    /// Bind to the connection the first command goes out on
    pub fn bind_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn to_broker_command(&self) -> BrokerCommand {
        BrokerCommand::new(self.kind, self.topic.clone(), self.id.clone(), &self.options)
    }

    /// Only live kinds keep the handle for later release
    pub fn attach_handle(&mut self, handle: SubscriptionHandle) {
        if self.kind.is_live() {
            self.handle = Some(handle);
        }
    }

    pub fn take_handle(&mut self) -> Option<SubscriptionHandle> {
        self.handle.take()
    }

    /// Messages from another connection or another command id are late
    pub fn accepts(&self, epoch: u64, message: &InboundMessage) -> bool {
        epoch == self.epoch && message.sub_id.as_deref().map_or(true, |id| id == self.id)
    }

    /// True exactly once, on the first live record of a live session
    pub fn mark_live_record(&mut self) -> bool {
        if !self.kind.is_live() || self.live_announced {
            return false;
        }
        self.live_announced = true;
        true
    }

    pub fn targets(&self, kind: CommandKind, topic: &str) -> bool {
        self.kind == kind && self.topic == topic.trim()
    }

    pub fn summary(&self) -> Option<SubscriptionSummary> {
        let handle = self.handle.as_ref()?;
        Some(SubscriptionSummary {
            id: handle.as_str().to_string(),
            topic: self.topic.clone(),
            command: self.kind,
            filter: self.options.filter().map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_id_format() {
        let id = generate_command_id();
        assert!(id.starts_with(COMMAND_ID_PREFIX));
        let rest = &id[COMMAND_ID_PREFIX.len()..];
        let (millis, random) = rest.split_once('_').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(random.len(), 9);
        assert_ne!(generate_command_id(), id);
    }

    #[test]
    fn test_empty_topic_is_rejected() {
        let err = CommandSession::new(CommandKind::Query, "   ", QueryOptions::new()).unwrap_err();
        assert!(matches!(err, ConsoleError::InvalidCommand { .. }));
    }

    #[test]
    fn test_handle_only_kept_for_live_kinds() {
        let mut query = CommandSession::new(CommandKind::Query, "Orders", QueryOptions::new()).unwrap();
        query.attach_handle(SubscriptionHandle::new("h1"));
        assert!(query.handle().is_none());
        assert!(query.summary().is_none());

        let mut sub = CommandSession::new(CommandKind::Subscribe, "Orders", QueryOptions::new()).unwrap();
        sub.attach_handle(SubscriptionHandle::new("h2"));
        assert_eq!(sub.summary().unwrap().id, "h2");
        assert_eq!(sub.take_handle().unwrap().as_str(), "h2");
        assert!(sub.take_handle().is_none());
    }

    #[test]
    fn test_accepts_filters_late_messages() {
        let mut session = CommandSession::new(CommandKind::Subscribe, "Orders", QueryOptions::new()).unwrap();
        session.bind_epoch(3);

        let untagged = InboundMessage::group_begin();
        let own = InboundMessage::group_begin().with_sub_id(session.id());
        let other = InboundMessage::group_begin().with_sub_id("amps_sub_0_old");

        assert!(session.accepts(3, &untagged));
        assert!(session.accepts(3, &own));
        assert!(!session.accepts(3, &other));
        assert!(!session.accepts(2, &own));
    }

    #[test]
    fn test_live_record_announced_once() {
        let mut session = CommandSession::new(CommandKind::QuerySubscribe, "Orders", QueryOptions::new()).unwrap();
        assert!(session.mark_live_record());
        assert!(!session.mark_live_record());

        let mut query = CommandSession::new(CommandKind::Query, "Orders", QueryOptions::new()).unwrap();
        assert!(!query.mark_live_record());
    }
}
