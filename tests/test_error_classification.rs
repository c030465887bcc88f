//! Broker error attribution to query fields

use amps_console::error::sanitize_error_message;
use amps_console::session::classifier::classify_detailed;
use amps_console::session::{classify, ErrorCategory, FieldErrors};

#[test]
fn test_known_broker_errors_are_attributed() {
    let cases = [
        ("Bad filter: unexpected token", ErrorCategory::Filter),
        ("Filter syntax error at position 12", ErrorCategory::Filter),
        ("Parse error in expression", ErrorCategory::Filter),
        ("Invalid OrderBy clause /nope", ErrorCategory::OrderBy),
        ("Cannot sort on this field", ErrorCategory::OrderBy),
        ("Invalid bookmark 12|34", ErrorCategory::Bookmark),
        ("Unknown option: foo", ErrorCategory::Options),
        ("top_n must be positive", ErrorCategory::Options),
        ("Conflation interval too small", ErrorCategory::Options),
        ("Topic Trades not found", ErrorCategory::General),
        ("Connection refused", ErrorCategory::General),
    ];
    for (raw, expected) in cases {
        assert_eq!(classify(raw), expected, "Failed for input: {raw}");
    }
}

#[test]
fn test_unrecognized_errors_fall_back_to_filter() {
    let classification = classify_detailed("something went wrong");
    assert_eq!(classification.category, ErrorCategory::Filter);
    assert!(classification.matched.is_none());
    assert_eq!(
        classification.field_message("something went wrong"),
        "AMPS Error: something went wrong"
    );
}

#[test]
fn test_filter_keywords_win_over_later_categories() {
    // "syntax error" is a filter keyword even though "order" also appears
    assert_eq!(classify("syntax error near order"), ErrorCategory::Filter);
}

#[test]
fn test_field_error_set_holds_the_latest_error_only() {
    let mut errors = FieldErrors::new();

    errors.record("Invalid filter /x ==");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.get(ErrorCategory::Filter), Some("Filter Error: Invalid filter /x =="));

    errors.record("Invalid bookmark abc");
    assert_eq!(errors.len(), 1);
    assert!(errors.get(ErrorCategory::Filter).is_none());
    assert_eq!(errors.get(ErrorCategory::Bookmark), Some("Bookmark Error: Invalid bookmark abc"));

    // general errors never land in the field set
    let general = errors.record("Topic not found");
    assert_eq!(general.category, ErrorCategory::General);
    assert!(errors.is_empty());
}

#[test]
fn test_field_errors_serialize_with_field_names() {
    let mut errors = FieldErrors::new();
    errors.record("bad orderby");
    let value = serde_json::to_value(&errors).unwrap();
    assert!(value.to_string().contains("orderBy"));
}

#[test]
fn test_sanitized_before_classification() {
    let raw = "Invalid filter for user password=hunter2";
    let message = sanitize_error_message(raw);
    let mut errors = FieldErrors::new();
    errors.record(&message);

    let stored = errors.get(ErrorCategory::Filter).unwrap();
    assert!(!stored.contains("hunter2"));
    assert!(stored.starts_with("Filter Error: Invalid filter"));
}
