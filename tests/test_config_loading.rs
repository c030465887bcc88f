//! Configuration loading and validation tests

use amps_console::config::{ConfigError, ConsoleConfig};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[[servers]]
name = "Primary"
host = "amps.internal"
websocket_port = 9100
admin_port = 8199

[connection]
default_message_format = "nvfix"
reconnect_delay_ms = 500
max_reconnect_attempts = 2

[grid]
page_size = 50
"#
    )
    .unwrap();

    let config = ConsoleConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.servers.len(), 1);
    let server = &config.servers[0];
    assert_eq!(server.name, "Primary");
    assert_eq!(server.tcp_port, 9007);
    assert_eq!(server.websocket_port, 9100);
    assert_eq!(
        server.websocket_url("json").unwrap().as_str(),
        "ws://amps.internal:9100/amps/json"
    );
    assert_eq!(server.config_url(), "http://amps.internal:8199/amps/instance/config.xml");

    assert_eq!(config.connection.default_message_format, "nvfix");
    assert_eq!(config.reconnect_config().max_attempts, 2);
    assert_eq!(config.reconnect_config().delay_ms, 500);
    assert_eq!(config.grid.page_size, 50);
}

#[test]
fn test_missing_sections_fall_back_to_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "# empty").unwrap();

    let config = ConsoleConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config, ConsoleConfig::default());
    assert_eq!(config.servers.len(), 2);
    assert_eq!(config.connection.reconnect_delay_ms, 3000);
    assert_eq!(config.connection.max_reconnect_attempts, 5);
}

#[test]
fn test_missing_file_is_a_read_error() {
    let result = ConsoleConfig::load_from_file(std::path::Path::new("/nonexistent/amps-console.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_a_parse_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "[[servers]\nname = ").unwrap();

    let result = ConsoleConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_invalid_values_are_rejected() {
    let cases = [
        ("servers = []", "at least one"),
        ("[[servers]]\nname = \"a\"\nhost = \"\"", "empty host"),
        (
            "[[servers]]\nname = \"a\"\nhost = \"h\"\n[[servers]]\nname = \"a\"\nhost = \"h2\"",
            "duplicate",
        ),
        ("[connection]\nmax_reconnect_attempts = 0", "max_reconnect_attempts"),
        ("[connection]\nreconnect_delay_ms = 0", "reconnect_delay_ms"),
        ("[grid]\npage_size = 0", "page_size"),
    ];

    for (content, expected) in cases {
        match ConsoleConfig::from_toml_str(content) {
            Err(ConfigError::InvalidConfig(message)) => {
                assert!(message.contains(expected), "{content:?} gave {message}");
            }
            other => panic!("expected InvalidConfig for {content:?}, got {other:?}"),
        }
    }
}

#[test]
fn test_find_server_by_name() {
    let config = ConsoleConfig::default();

    assert_eq!(
        config.find_server("Google Cloud AMPS (Dev)").unwrap().host,
        "34.68.65.149"
    );
    assert_eq!(
        config.find_server("google cloud amps (dev 2)").unwrap().host,
        "34.68.65.150"
    );
    assert!(matches!(
        config.find_server("Production"),
        Err(ConfigError::UnknownServer(name)) if name == "Production"
    ));
}
