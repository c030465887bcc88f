//! Broker error classification
//!
//! Pure keyword matching that attributes a raw broker error to the query
//! field most likely responsible. Groups are tried in order and the first
//! keyword hit wins, so "invalid bookmark" lands in `bookmark` but
//! "order filter parse error" lands in `filter`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Field (or the general sentinel) an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    Filter,
    OrderBy,
    Bookmark,
    Options,
    /// Not attributable to a field; surfaced as the execution error
    General,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Filter => "filter",
            ErrorCategory::OrderBy => "orderBy",
            ErrorCategory::Bookmark => "bookmark",
            ErrorCategory::Options => "options",
            ErrorCategory::General => "general",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            ErrorCategory::Filter => "Filter",
            ErrorCategory::OrderBy => "OrderBy",
            ErrorCategory::Bookmark => "Bookmark",
            ErrorCategory::Options => "Options",
            ErrorCategory::General => "General",
        }
    }

    pub fn is_field(&self) -> bool {
        !matches!(self, ErrorCategory::General)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ERROR_PATTERNS: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::Filter,
        &[
            "bad filter",
            "invalid filter",
            "filter syntax",
            "parse error",
            "syntax error",
        ],
    ),
    (ErrorCategory::OrderBy, &["order", "orderby", "sort"]),
    (ErrorCategory::Bookmark, &["bookmark", "invalid bookmark"]),
    (
        ErrorCategory::Options,
        &["option", "top_n", "conflation", "invalid option"],
    ),
    (ErrorCategory::General, &["topic", "not found", "connection"]),
];

/// Outcome of classifying one error string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    /// Keyword that matched; `None` when the fallback applied
    pub matched: Option<&'static str>,
}

impl Classification {
    /// Message stored in the field-error set for this classification
    pub fn field_message(&self, raw: &str) -> String {
        match self.matched {
            Some(_) => format!("{} Error: {}", self.category.prefix(), raw),
            None => format!("AMPS Error: {}", raw),
        }
    }
}

pub fn classify_detailed(raw: &str) -> Classification {
    let lowered = raw.to_lowercase();
    for (category, keywords) in ERROR_PATTERNS {
        if let Some(keyword) = keywords.iter().find(|k| lowered.contains(*k)) {
            return Classification {
                category: *category,
                matched: Some(keyword),
            };
        }
    }
    Classification {
        category: ErrorCategory::Filter,
        matched: None,
    }
}

pub fn classify(raw: &str) -> ErrorCategory {
    classify_detailed(raw).category
}

/// Per-field error messages; `general` is never stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors {
    entries: BTreeMap<ErrorCategory, String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the set and record `raw` under its category.
    /// Returns the classification so the caller can route general errors.
    pub fn record(&mut self, raw: &str) -> Classification {
        let classification = classify_detailed(raw);
        self.record_with(classification, raw);
        classification
    }

    /// Reset the set and store `message` under an existing classification
    pub fn record_with(&mut self, classification: Classification, message: &str) {
        self.entries.clear();
        if classification.category.is_field() {
            self.entries
                .insert(classification.category, classification.field_message(message));
        }
    }

    pub fn get(&self, category: ErrorCategory) -> Option<&str> {
        self.entries.get(&category).map(String::as_str)
    }

    pub fn clear(&mut self) -> bool {
        let had_entries = !self.entries.is_empty();
        self.entries.clear();
        had_entries
    }

    pub fn clear_field(&mut self, category: ErrorCategory) -> bool {
        self.entries.remove(&category).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ErrorCategory, &str)> {
        self.entries.iter().map(|(c, m)| (*c, m.as_str()))
    }

    /// One-line description naming the field the error was attributed to
    pub fn summary(&self) -> Option<String> {
        self.iter()
            .next()
            .map(|(category, message)| format!("{}: {}", category.as_str(), message))
    }
}
