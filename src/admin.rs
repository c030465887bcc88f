//! Topic discovery through the broker's admin interface
//!
//! The instance configuration is served as XML at
//! `http://{host}:{admin_port}/amps/instance/config.xml`. Only the `<SOW>`
//! section matters here: each `<Topic>` in it declares a name, message type
//! and key.

use crate::config::ServerConfig;
use crate::protocol::{fallback_topics, TopicInfo, DEFAULT_MESSAGE_FORMAT};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

static SOW_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<SOW\b[^>]*>(.*?)</SOW>").expect("SOW pattern is valid"));
static TOPIC_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<Topic\b[^>]*>(.*?)</Topic>").expect("Topic pattern is valid"));
static NAME_ELEMENT: Lazy<Regex> = Lazy::new(|| child_pattern("Name"));
static MESSAGE_TYPE_ELEMENT: Lazy<Regex> = Lazy::new(|| child_pattern("MessageType"));
static KEY_ELEMENT: Lazy<Regex> = Lazy::new(|| child_pattern("Key"));
static FILE_NAME_ELEMENT: Lazy<Regex> = Lazy::new(|| child_pattern("FileName"));

fn child_pattern(tag: &str) -> Regex {
    Regex::new(&format!(r"(?s)<{tag}\b[^>]*>(.*?)</{tag}>")).expect("child pattern is valid")
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("HTTP client error: {0}")]
    Client(String),
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Admin interface returned {status}")]
    Status { status: u16 },
    #[error("No SOW section found in AMPS config")]
    MissingSowSection,
}

/// Discovered topics plus the reason discovery fell back, if it did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResult {
    pub topics: Vec<TopicInfo>,
    pub error: Option<String>,
}

impl DiscoveryResult {
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

pub struct TopicDiscovery {
    client: Client,
}

impl TopicDiscovery {
    pub fn new(timeout: Duration) -> Result<Self, DiscoveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DiscoveryError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Topics of `server`, or the fallback list with an error
    pub async fn fetch_topics(&self, server: &ServerConfig) -> DiscoveryResult {
        let url = server.config_url();
        match self.fetch_config(&url).await.and_then(|xml| parse_topics_from_config(&xml)) {
            Ok(topics) => {
                info!(server = %server.name, count = topics.len(), "Discovered SOW topics");
                DiscoveryResult { topics, error: None }
            }
            Err(e) => {
                warn!(server = %server.name, url = %url, error = %e, "Topic discovery failed, using fallback topics");
                DiscoveryResult {
                    topics: fallback_topics(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn fetch_config(&self, url: &str) -> Result<String, DiscoveryError> {
        debug!(url = %url, "Fetching AMPS instance config");
        let response = self
            .client
            .get(url)
            .header("Accept", "application/xml, text/xml, */*")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

/// SOW topics declared in an instance config, deduplicated and sorted
pub fn parse_topics_from_config(xml: &str) -> Result<Vec<TopicInfo>, DiscoveryError> {
    let sow = SOW_SECTION
        .captures(xml)
        .and_then(|c| c.get(1))
        .ok_or(DiscoveryError::MissingSowSection)?
        .as_str();

    let mut seen = HashSet::new();
    let mut topics: Vec<TopicInfo> = TOPIC_ELEMENT
        .captures_iter(sow)
        .filter_map(|c| c.get(1))
        .filter_map(|body| parse_topic(body.as_str()))
        .filter(|topic| seen.insert(topic.name.clone()))
        .collect();

    topics.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(topics)
}

fn parse_topic(body: &str) -> Option<TopicInfo> {
    let name = child_text(&NAME_ELEMENT, body).filter(|n| !n.is_empty())?;
    let message_type = child_text(&MESSAGE_TYPE_ELEMENT, body)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_MESSAGE_FORMAT.to_string());
    let key = child_text(&KEY_ELEMENT, body).unwrap_or_default();
    let file_name = child_text(&FILE_NAME_ELEMENT, body).filter(|f| !f.is_empty());

    Some(TopicInfo {
        name,
        message_type,
        key,
        file_name,
    })
}

fn child_text(pattern: &Regex, body: &str) -> Option<String> {
    pattern
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| unescape_xml(m.as_str().trim()))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"<?xml version="1.0"?>
<AMPSConfig>
  <Name>amps-dev</Name>
  <SOW>
    <Topic>
      <Name>Orders</Name>
      <MessageType>json</MessageType>
      <Key>/id</Key>
      <FileName>./sow/%n.sow</FileName>
    </Topic>
    <Topic>
      <Name>fix_orders</Name>
      <MessageType>nvfix</MessageType>
      <Key>/11</Key>
    </Topic>
    <Topic>
      <Name>Orders</Name>
      <MessageType>xml</MessageType>
    </Topic>
    <Topic>
      <MessageType>json</MessageType>
    </Topic>
    <Topic>
      <Name>Alerts</Name>
    </Topic>
  </SOW>
</AMPSConfig>"#;

    #[test]
    fn test_parse_topics() {
        let topics = parse_topics_from_config(CONFIG).unwrap();
        let names: Vec<_> = topics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Alerts", "Orders", "fix_orders"]);

        let orders = &topics[1];
        assert_eq!(orders.message_type, "json");
        assert_eq!(orders.key, "/id");
        assert_eq!(orders.file_name.as_deref(), Some("./sow/%n.sow"));

        let alerts = &topics[0];
        assert_eq!(alerts.message_type, "json");
        assert_eq!(alerts.key, "");
        assert_eq!(alerts.file_name, None);
    }

    #[test]
    fn test_missing_sow_section() {
        let result = parse_topics_from_config("<AMPSConfig><Name>x</Name></AMPSConfig>");
        assert!(matches!(result, Err(DiscoveryError::MissingSowSection)));
    }

    #[test]
    fn test_sow_stats_element_is_not_a_sow_section() {
        let xml = "<AMPSConfig><SOWStatsInterval>10s</SOWStatsInterval></AMPSConfig>";
        assert!(parse_topics_from_config(xml).is_err());
    }

    #[test]
    fn test_entities_are_unescaped() {
        let xml = "<SOW><Topic><Name>a&amp;b</Name><Key>/x</Key></Topic></SOW>";
        let topics = parse_topics_from_config(xml).unwrap();
        assert_eq!(topics[0].name, "a&b");
    }
}
