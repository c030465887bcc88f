//! Command kinds, query options and outbound broker commands
//!
//! A console execution is one of four command kinds. Each kind maps to an
//! exact AMPS wire command and carries a default `top_n` option used when
//! the operator leaves the options field empty.

use crate::error::ConsoleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four console command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    /// State-of-the-world snapshot
    Query,
    /// Live stream of publishes
    Subscribe,
    /// Snapshot followed by a live stream
    QuerySubscribe,
    /// One-shot SOW statistics
    SowStats,
}

impl CommandKind {
    pub const ALL: [CommandKind; 4] = [
        CommandKind::Query,
        CommandKind::Subscribe,
        CommandKind::QuerySubscribe,
        CommandKind::SowStats,
    ];

    /// AMPS wire command name
    pub fn wire_name(&self) -> &'static str {
        match self {
            CommandKind::Query => "sow",
            CommandKind::Subscribe => "subscribe",
            CommandKind::QuerySubscribe => "sow_and_subscribe",
            CommandKind::SowStats => "sow_stats",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.wire_name() == name)
    }

    /// Options sent when the operator supplied none
    pub fn default_options(&self) -> &'static str {
        match self {
            CommandKind::Query => "top_n=500",
            CommandKind::Subscribe | CommandKind::QuerySubscribe => "top_n=250",
            CommandKind::SowStats => "top_n=100",
        }
    }

    /// Kinds that hold a broker subscription handle until stopped
    pub fn is_live(&self) -> bool {
        matches!(self, CommandKind::Subscribe | CommandKind::QuerySubscribe)
    }

    /// Kinds whose snapshot replaces the visible row-set
    pub fn replaces_rows(&self) -> bool {
        matches!(self, CommandKind::Query | CommandKind::QuerySubscribe)
    }

    /// Human label used in notifications
    pub fn label(&self) -> &'static str {
        match self {
            CommandKind::Query => "Query",
            CommandKind::Subscribe => "Subscription",
            CommandKind::QuerySubscribe => "Query + Subscription",
            CommandKind::SowStats => "Stats",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for CommandKind {
    type Err = ConsoleError;

    /// Accepts wire names as well as the console's own spellings
    /// (`query`, `query-subscribe`, `stats`, ...), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        if let Some(kind) = Self::from_wire(&normalized) {
            return Ok(kind);
        }
        match normalized.as_str() {
            "query" => Ok(CommandKind::Query),
            "query_subscribe" | "querysubscribe" => Ok(CommandKind::QuerySubscribe),
            "stats" | "sowstats" => Ok(CommandKind::SowStats),
            "" => Err(ConsoleError::InvalidCommand {
                message: "Command is required".to_string(),
            }),
            _ => Err(ConsoleError::InvalidCommand {
                message: format!("Unknown command: {}", s.trim()),
            }),
        }
    }
}

/// Operator-supplied query options; empty strings count as absent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub bookmark: Option<String>,
    pub options: Option<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_bookmark(mut self, bookmark: impl Into<String>) -> Self {
        self.bookmark = Some(bookmark.into());
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    pub fn filter(&self) -> Option<&str> {
        non_empty(&self.filter)
    }

    pub fn order_by(&self) -> Option<&str> {
        non_empty(&self.order_by)
    }

    pub fn bookmark(&self) -> Option<&str> {
        non_empty(&self.bookmark)
    }

    /// Options string actually sent: the operator's text verbatim when
    /// non-empty, otherwise the command kind's default.
    pub fn effective_options(&self, kind: CommandKind) -> String {
        non_empty(&self.options)
            .map(str::to_string)
            .unwrap_or_else(|| kind.default_options().to_string())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Structured command handed to the broker client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerCommand {
    pub kind: CommandKind,
    pub topic: String,
    pub command_id: String,
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub bookmark: Option<String>,
    pub options: String,
}

impl BrokerCommand {
    pub fn new(
        kind: CommandKind,
        topic: impl Into<String>,
        command_id: impl Into<String>,
        options: &QueryOptions,
    ) -> Self {
        Self {
            kind,
            topic: topic.into(),
            command_id: command_id.into(),
            filter: options.filter().map(str::to_string),
            order_by: options.order_by().map(str::to_string),
            bookmark: options.bookmark().map(str::to_string),
            options: options.effective_options(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_mapping_is_exact() {
        assert_eq!(CommandKind::Query.wire_name(), "sow");
        assert_eq!(CommandKind::Subscribe.wire_name(), "subscribe");
        assert_eq!(CommandKind::QuerySubscribe.wire_name(), "sow_and_subscribe");
        assert_eq!(CommandKind::SowStats.wire_name(), "sow_stats");
    }

    #[test]
    fn test_default_options_per_kind() {
        let empty = QueryOptions::new();
        assert_eq!(empty.effective_options(CommandKind::Query), "top_n=500");
        assert_eq!(empty.effective_options(CommandKind::Subscribe), "top_n=250");
        assert_eq!(
            empty.effective_options(CommandKind::QuerySubscribe),
            "top_n=250"
        );
        assert_eq!(empty.effective_options(CommandKind::SowStats), "top_n=100");
    }

    #[test]
    fn test_user_options_pass_through_verbatim() {
        let opts = QueryOptions::new().with_options("top_n=10,conflation=1s");
        assert_eq!(
            opts.effective_options(CommandKind::Query),
            "top_n=10,conflation=1s"
        );

        let blank = QueryOptions::new().with_options("");
        assert_eq!(blank.effective_options(CommandKind::Query), "top_n=500");
    }

    #[test]
    fn test_parse_command_kind_spellings() {
        assert_eq!("sow".parse::<CommandKind>().unwrap(), CommandKind::Query);
        assert_eq!("query".parse::<CommandKind>().unwrap(), CommandKind::Query);
        assert_eq!(
            "query-subscribe".parse::<CommandKind>().unwrap(),
            CommandKind::QuerySubscribe
        );
        assert_eq!(
            "SOW_AND_SUBSCRIBE".parse::<CommandKind>().unwrap(),
            CommandKind::QuerySubscribe
        );
        assert_eq!("stats".parse::<CommandKind>().unwrap(), CommandKind::SowStats);
    }

    #[test]
    fn test_parse_rejects_unknown_and_empty() {
        assert!(matches!(
            "delete".parse::<CommandKind>(),
            Err(ConsoleError::InvalidCommand { .. })
        ));
        assert!(matches!(
            "  ".parse::<CommandKind>(),
            Err(ConsoleError::InvalidCommand { .. })
        ));
    }

    #[test]
    fn test_broker_command_drops_empty_fields() {
        let opts = QueryOptions::new()
            .with_filter("/symbol = 'GSK'")
            .with_order_by("")
            .with_bookmark("recent");
        let cmd = BrokerCommand::new(CommandKind::Subscribe, "market_data", "amps_sub_1", &opts);

        assert_eq!(cmd.filter.as_deref(), Some("/symbol = 'GSK'"));
        assert_eq!(cmd.order_by, None);
        assert_eq!(cmd.bookmark.as_deref(), Some("recent"));
        assert_eq!(cmd.options, "top_n=250");
    }
}
