//! Console error types
//!
//! Only `connect` and `execute_command` return errors to callers; every
//! other failure is recorded in a snapshot. Broker text is sanitized before
//! it is stored or logged.

use crate::config::ConfigError;
use crate::transport::websocket::connection::ConnectionError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const MAX_ERROR_LEN: usize = 500;
const TRUNCATE_SUFFIX: &str = "...[truncated]";

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|passwd|token|secret|credential)[=:]\s*\S+")
        .expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Invalid command: {message}")]
    InvalidCommand { message: String },

    #[error("Broker error: {message}")]
    Broker { message: String },

    #[error("Failed to release subscription {handle}: {message}")]
    SubscriptionRelease { handle: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ConsoleError {
    pub fn invalid_command<S: Into<String>>(message: S) -> Self {
        Self::InvalidCommand {
            message: message.into(),
        }
    }

    pub fn broker<S: Into<String>>(message: S) -> Self {
        Self::Broker {
            message: sanitize_error_message(&message.into()),
        }
    }
}

/// Redact secrets and sensitive paths, cap at 500 bytes
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .into_owned();

    if sanitized.len() > MAX_ERROR_LEN {
        let mut cut = MAX_ERROR_LEN - TRUNCATE_SUFFIX.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(TRUNCATE_SUFFIX);
    }
    sanitized
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;
