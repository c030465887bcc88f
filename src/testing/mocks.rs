//! Mock broker client for testing
//!
//! [`MockBrokerClient`] records every call made through the
//! [`BrokerClient`] seam and lets a test inject inbound traffic or
//! connection failures through the sink it was handed on connect. Clones
//! share state, so a test keeps one clone while the controller owns another.

use crate::protocol::{BrokerCommand, InboundMessage};
use crate::transport::websocket::connection::ConnectionError;
use crate::transport::{BrokerClient, EventSink, SubscriptionHandle};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    sink: Option<EventSink>,
    connect_urls: Vec<String>,
    executed: Vec<BrokerCommand>,
    unsubscribed: Vec<SubscriptionHandle>,
    disconnects: usize,
    failing_connects: usize,
    fail_all_connects: bool,
    fail_execute: bool,
    fail_unsubscribe: bool,
}

#[derive(Debug, Clone)]
pub struct MockBrokerClient {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBrokerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrokerClient {
    pub fn new() -> Self {
        Self {
            name: "AMPSConsole_mock".to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` connect calls
    pub fn fail_next_connects(&self, count: usize) {
        self.state().failing_connects = count;
    }

    pub fn fail_all_connects(&self, fail: bool) {
        self.state().fail_all_connects = fail;
    }

    pub fn fail_execute(&self, fail: bool) {
        self.state().fail_execute = fail;
    }

    pub fn fail_unsubscribe(&self, fail: bool) {
        self.state().fail_unsubscribe = fail;
    }

    pub fn connect_urls(&self) -> Vec<String> {
        self.state().connect_urls.clone()
    }

    pub fn executed_commands(&self) -> Vec<BrokerCommand> {
        self.state().executed.clone()
    }

    pub fn last_command(&self) -> Option<BrokerCommand> {
        self.state().executed.last().cloned()
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionHandle> {
        self.state().unsubscribed.clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.state().disconnects
    }

    /// The sink of the current connection
    pub fn sink(&self) -> Option<EventSink> {
        self.state().sink.clone()
    }

    /// Deliver `message` as if the broker had sent it
    pub fn push_message(&self, message: InboundMessage) -> bool {
        match self.sink() {
            Some(sink) => sink.message(message),
            None => false,
        }
    }

    /// Close the connection from the broker side
    pub fn drop_connection(&self, reason: &str) -> bool {
        let sink = {
            let mut state = self.state();
            state.connected = false;
            state.sink.take()
        };
        sink.is_some_and(|sink| sink.closed(reason))
    }

    /// Lose the connection without reporting it
    pub fn simulate_silent_drop(&self) {
        let mut state = self.state();
        state.connected = false;
        state.sink = None;
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn connect(&mut self, url: &str, sink: EventSink) -> Result<(), ConnectionError> {
        let mut state = self.state();
        state.connect_urls.push(url.to_string());
        if state.fail_all_connects || state.failing_connects > 0 {
            state.failing_connects = state.failing_connects.saturating_sub(1);
            state.connected = false;
            state.sink = None;
            return Err(ConnectionError::ConnectFailed(format!("Connection refused: {}", url)));
        }
        state.connected = true;
        state.sink = Some(sink);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectionError> {
        let mut state = self.state();
        state.disconnects += 1;
        state.connected = false;
        state.sink = None;
        Ok(())
    }

    async fn execute(&mut self, command: &BrokerCommand) -> Result<SubscriptionHandle, ConnectionError> {
        let mut state = self.state();
        if !state.connected {
            return Err(ConnectionError::SendFailed("connection closed".to_string()));
        }
        if state.fail_execute {
            return Err(ConnectionError::SendFailed("broker rejected command".to_string()));
        }
        state.executed.push(command.clone());
        Ok(SubscriptionHandle::new(command.command_id.clone()))
    }

    async fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> Result<(), ConnectionError> {
        let mut state = self.state();
        if state.fail_unsubscribe {
            return Err(ConnectionError::SendFailed("unsubscribe refused".to_string()));
        }
        state.unsubscribed.push(handle.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn client_name(&self) -> &str {
        &self.name
    }
}
