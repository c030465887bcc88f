//! Test helpers and utilities for integration tests

use amps_console::config::{ConsoleConfig, ServerConfig};
use amps_console::session::{ControllerEvent, ControllerOptions, SessionController};
use amps_console::testing::MockBrokerClient;
use std::time::Duration;

/// A configuration with one local server and fast reconnection
#[allow(dead_code)]
pub fn test_config() -> ConsoleConfig {
    let mut config = ConsoleConfig {
        servers: vec![test_server()],
        ..ConsoleConfig::default()
    };
    config.connection.reconnect_delay_ms = 10;
    config.connection.max_reconnect_attempts = 3;
    config
}

#[allow(dead_code)]
pub fn test_server() -> ServerConfig {
    ServerConfig::new("Local AMPS", "127.0.0.1")
}

/// Controller over a mock client, plus a handle onto the same mock
#[allow(dead_code)]
pub fn mock_controller() -> (SessionController<MockBrokerClient>, MockBrokerClient) {
    let client = MockBrokerClient::new();
    let observer = client.clone();
    let controller = SessionController::new(client, &test_config(), ControllerOptions::default());
    (controller, observer)
}

/// Controller already connected to [`test_server`]
#[allow(dead_code)]
pub async fn connected_controller() -> (SessionController<MockBrokerClient>, MockBrokerClient) {
    let (mut controller, observer) = mock_controller();
    controller
        .connect(&test_server())
        .await
        .expect("mock connect should succeed");
    (controller, observer)
}

/// Wait for the next controller event, failing the test after a second
#[allow(dead_code)]
pub async fn next_event(controller: &mut SessionController<MockBrokerClient>) -> ControllerEvent {
    tokio::time::timeout(Duration::from_secs(1), controller.next_event())
        .await
        .expect("timed out waiting for controller event")
}
