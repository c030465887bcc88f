//! Topic metadata and topic name validation

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Message format used when a topic does not declare one
pub const DEFAULT_MESSAGE_FORMAT: &str = "json";

/// Longest topic name the console accepts
pub const MAX_TOPIC_NAME_LEN: usize = 255;

static TOPIC_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_.-]*$").expect("topic name pattern is valid")
});

/// A SOW topic as declared in the broker's instance configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    pub name: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    /// SOW key expression, e.g. `/id` or `/account_id,/symbol`
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

fn default_message_type() -> String {
    DEFAULT_MESSAGE_FORMAT.to_string()
}

impl TopicInfo {
    pub fn new(name: impl Into<String>, message_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message_type: message_type.into(),
            key: key.into(),
            file_name: None,
        }
    }

    /// Wire format path segment this topic requires
    pub fn message_format(&self) -> String {
        let format = self.message_type.trim();
        if format.is_empty() {
            DEFAULT_MESSAGE_FORMAT.to_string()
        } else {
            format.to_ascii_lowercase()
        }
    }
}

/// Topics offered when the admin interface cannot be reached
pub fn fallback_topics() -> Vec<TopicInfo> {
    vec![
        TopicInfo::new("Orders", "json", "/id"),
        TopicInfo::new("market_data", "json", "/symbol"),
        TopicInfo::new("Trades", "json", "/trade_id"),
        TopicInfo::new("Quotes", "json", "/symbol"),
        TopicInfo::new("Positions", "json", "/account_id,/symbol"),
    ]
}

pub fn is_valid_topic_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_TOPIC_NAME_LEN && TOPIC_NAME_PATTERN.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_topic_name_validation_examples() {
        assert!(is_valid_topic_name("Orders"));
        assert!(is_valid_topic_name("market_data"));
        assert!(is_valid_topic_name("fx.rates-v2"));

        assert!(!is_valid_topic_name(""));
        assert!(!is_valid_topic_name("1orders"));
        assert!(!is_valid_topic_name("orders/eu"));
        assert!(!is_valid_topic_name("my topic"));
        assert!(!is_valid_topic_name(&format!("a{}", "b".repeat(255))));
    }

    #[test]
    fn test_message_format_defaults_to_json() {
        assert_eq!(TopicInfo::new("Orders", "", "/id").message_format(), "json");
        assert_eq!(TopicInfo::new("Fix", "NVFIX", "/1").message_format(), "nvfix");
    }

    #[test]
    fn test_fallback_topics_are_json_and_valid() {
        let topics = fallback_topics();
        assert_eq!(topics.len(), 5);
        assert!(topics.iter().all(|t| t.message_type == "json"));
        assert!(topics.iter().all(|t| is_valid_topic_name(&t.name)));
        assert_eq!(topics[4].key, "/account_id,/symbol");
    }

    proptest! {
        #[test]
        fn valid_names_are_accepted(name in "[a-zA-Z][a-zA-Z0-9_.-]{0,200}") {
            prop_assert!(is_valid_topic_name(&name));
        }

        #[test]
        fn names_with_spaces_are_rejected(prefix in "[a-z]{1,10}", suffix in "[a-z]{0,10}") {
            let name = format!("{} {}", prefix, suffix);
            prop_assert!(!is_valid_topic_name(&name));
        }
    }
}
