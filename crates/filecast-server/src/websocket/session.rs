//! WebSocket session lifecycle: one upgraded socket from split through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::connection::{ClientConnection, ConnectionId, MessageSink, MessageSource};
use super::dispatch::DispatchSender;
use super::reader::Reader;
use super::registry::ConnectionRegistry;
use crate::errors::{RelayError, Result};
use crate::message::FileMessage;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Write half of an upgraded socket.
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSink {
    /// Wrap the write half.
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send_text(&self, frame: Arc<String>) -> Result<()> {
        let mut sink = self.inner.lock().await;
        sink.send(Message::Text(frame.as_str().into()))
            .await
            .map_err(|e| RelayError::Write(e.to_string()))
    }

    async fn close(&self) {
        let mut sink = self.inner.lock().await;
        let _ = sink.close().await;
    }
}

/// Read half of an upgraded socket.
///
/// Text and binary frames are both decoded as JSON. Ping and pong frames are
/// answered by the transport and skipped here.
pub struct WsSource {
    inner: SplitStream<WebSocket>,
}

impl WsSource {
    /// Wrap the read half.
    pub fn new(inner: SplitStream<WebSocket>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl MessageSource for WsSource {
    async fn next_message(&mut self) -> Result<FileMessage> {
        loop {
            let frame = match self.inner.next().await {
                None => return Err(RelayError::Closed),
                Some(Err(e)) => return Err(RelayError::Read(e.to_string())),
                Some(Ok(frame)) => frame,
            };
            match frame {
                Message::Text(text) => return FileMessage::decode(text.as_str().as_bytes()),
                Message::Binary(data) => return FileMessage::decode(&data),
                Message::Close(_) => return Err(RelayError::Closed),
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }
}

/// Shared pieces every session needs.
#[derive(Clone)]
pub struct SessionContext {
    /// Connected clients.
    pub registry: Arc<ConnectionRegistry>,
    /// Producer side of the dispatch queue.
    pub queue: DispatchSender,
    /// Process-wide shutdown signal.
    pub shutdown: CancellationToken,
    /// Upper bound on the final socket close.
    pub close_timeout: Duration,
}

/// Run a WebSocket session for a connected client.
///
/// Registers the client, forwards its messages until the first failure, then
/// deregisters it and closes the socket.
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(ws: WebSocket, client_id: ConnectionId, ctx: SessionContext) {
    let (ws_tx, ws_rx) = ws.split();
    let connection = Arc::new(ClientConnection::with_id(client_id, WsSink::new(ws_tx)));

    let connection_start = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let mut reader = Reader::new(
        connection.clone(),
        WsSource::new(ws_rx),
        ctx.registry,
        ctx.queue,
        ctx.shutdown,
        ctx.close_timeout,
    );
    let exit = reader.run().await;

    info!(
        reason = exit.reason.kind(),
        messages = exit.messages_read,
        delivered = connection.delivered_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => exit.reason.kind()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
}
