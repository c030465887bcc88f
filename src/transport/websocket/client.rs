//! Socket I/O for the WebSocket broker client
//!
//! `connect` opens the socket, sends the logon frame and spawns a reader
//! task that decodes frames into the event sink. The reader reports an
//! unexpected closure as `TransportEvent::Closed`; a shutdown requested by
//! `disconnect` ends it silently.

use super::connection::{ConnectionError, ConnectionStatus};
use super::message_handler::{FrameRoute, MessageHandler};
use crate::protocol::BrokerCommand;
use crate::transport::{BrokerClient, EventSink, SubscriptionHandle};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const READER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct WebSocketBrokerClient {
    client_name: String,
    connect_timeout: Duration,
    writer: Option<WsSink>,
    reader_handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    connected: Arc<AtomicBool>,
}

impl WebSocketBrokerClient {
    pub fn new(client_name: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            client_name: client_name.into(),
            connect_timeout,
            writer: None,
            reader_handle: None,
            shutdown_tx: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError> {
        let writer = self.writer.as_mut().ok_or_else(|| ConnectionError::NotConnected {
            state: ConnectionStatus::Disconnected(None),
        })?;
        writer
            .send(Message::Text(text))
            .await
            .map_err(|e| ConnectionError::SendFailed(e.to_string()))
    }

    async fn stop_reader(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.reader_handle.take() {
            match tokio::time::timeout(READER_SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => debug!("Reader task stopped"),
                Ok(Err(e)) if !e.is_cancelled() => warn!("Reader task ended with error: {}", e),
                Err(_) => warn!("Reader task did not stop in time"),
                _ => {}
            }
        }
    }

    async fn run_reader(
        mut source: WsSource,
        sink: EventSink,
        mut shutdown_rx: watch::Receiver<bool>,
        connected: Arc<AtomicBool>,
    ) {
        let reason = loop {
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("Reader received shutdown signal");
                        return;
                    }
                }
                next = source.next() => match next {
                    Some(Ok(message)) => match MessageHandler::route_ws_message(message) {
                        FrameRoute::Text(text) => match MessageHandler::decode_frame(&text) {
                            Ok(inbound) => {
                                if !sink.message(inbound) {
                                    debug!("Event sink dropped, stopping reader");
                                    return;
                                }
                            }
                            Err(e) => warn!(error = %e, "Discarding undecodable frame"),
                        },
                        FrameRoute::Closed(reason) => break reason,
                        FrameRoute::Ignored => {}
                    },
                    Some(Err(e)) => break format!("WebSocket error: {e}"),
                    None => break "Connection closed".to_string(),
                },
            }
        };

        connected.store(false, Ordering::SeqCst);
        if !*shutdown_rx.borrow() {
            warn!(reason = %reason, "Broker connection closed unexpectedly");
            sink.closed(reason);
        }
    }
}

#[async_trait]
impl BrokerClient for WebSocketBrokerClient {
    async fn connect(&mut self, url: &str, sink: EventSink) -> Result<(), ConnectionError> {
        let parsed = Url::parse(url).map_err(|_| ConnectionError::InvalidUrl(url.to_string()))?;
        if self.writer.is_some() {
            if let Err(e) = self.disconnect().await {
                debug!(error = %e, "Previous connection did not close cleanly");
            }
        }

        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(parsed.as_str()))
            .await
            .map_err(|_| ConnectionError::Timeout(self.connect_timeout))?
            .map_err(|e| ConnectionError::ConnectFailed(e.to_string()))?;

        let (writer, source) = stream.split();
        self.writer = Some(writer);

        let logon = MessageHandler::encode_logon(&Uuid::new_v4().to_string(), &self.client_name)?;
        if let Err(e) = self.send_text(logon).await {
            self.writer = None;
            return Err(e);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.connected.store(true, Ordering::SeqCst);
        self.reader_handle = Some(tokio::spawn(Self::run_reader(
            source,
            sink,
            shutdown_rx,
            self.connected.clone(),
        )));
        self.shutdown_tx = Some(shutdown_tx);

        info!(url = %parsed, client_name = %self.client_name, "WebSocket connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectionError> {
        self.stop_reader().await;
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut writer) = self.writer.take() {
            writer
                .close()
                .await
                .map_err(|e| ConnectionError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn execute(&mut self, command: &BrokerCommand) -> Result<SubscriptionHandle, ConnectionError> {
        let frame = MessageHandler::encode_command(command)?;
        self.send_text(frame).await?;
        debug!(command = %command.kind, topic = %command.topic, cid = %command.command_id, "Command sent");
        Ok(SubscriptionHandle::new(command.command_id.clone()))
    }

    async fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> Result<(), ConnectionError> {
        let frame = MessageHandler::encode_unsubscribe(&Uuid::new_v4().to_string(), handle.as_str())?;
        self.send_text(frame).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn client_name(&self) -> &str {
        &self.client_name
    }
}

impl Drop for WebSocketBrokerClient {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
    }
}
