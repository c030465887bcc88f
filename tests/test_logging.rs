//! Tests for logging configuration and format parsing

use amps_console::observability::logging::{build_filter, parse_level, parse_spans_flag, LogFormat};
use amps_console::{broker_span, session_span};
use tracing::Level;

#[test]
fn test_log_format_parse_is_case_insensitive() {
    assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
    assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("COMPACT"), LogFormat::Compact);
}

#[test]
fn test_log_format_defaults_to_compact() {
    for input in ["", "xml", "yaml", "123"] {
        assert_eq!(LogFormat::parse(input), LogFormat::Compact, "Failed for input: {input}");
    }
}

#[test]
fn test_unknown_level_defaults_to_info() {
    assert_eq!(parse_level("loud"), Level::INFO);
    assert_eq!(parse_level(""), Level::INFO);
    assert_eq!(parse_level("warn"), Level::WARN);
}

#[test]
fn test_spans_flag() {
    assert!(parse_spans_flag("True"));
    assert!(!parse_spans_flag("false"));
    assert!(!parse_spans_flag("on"));
}

#[test]
fn test_filter_caps_websocket_noise() {
    let filter = build_filter(Level::TRACE, None).to_string();
    assert!(filter.contains("trace"));
    assert!(filter.contains("tokio_tungstenite=warn"));
    assert!(filter.contains("hyper=warn"));
}

#[test]
fn test_span_macros_build_spans() {
    let session = session_span!(topic = "Orders", command = "sow");
    let broker = broker_span!(server = "Local AMPS");
    let _entered = session.enter();
    drop(broker);
}
