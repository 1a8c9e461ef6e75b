//! Client handle and the transport seams it is built on.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::{RelayError, Result};
use crate::message::FileMessage;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one client connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate a fresh id. Ids are never reused within a process.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

/// Write half of a client channel.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send one encoded frame.
    async fn send_text(&self, frame: Arc<String>) -> Result<()>;

    /// Release the channel. Errors are swallowed; the peer may already be gone.
    async fn close(&self);
}

/// Read half of a client channel.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next decoded message.
    ///
    /// Every failure (malformed payload, orderly close, transport fault) is
    /// returned as an error and ends the reader.
    async fn next_message(&mut self) -> Result<FileMessage>;
}

/// One connected client as seen by the registry and the broadcast loop.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    sink: Box<dyn MessageSink>,
    /// When this connection was established.
    pub connected_at: Instant,
    closing: AtomicBool,
    closed: CancellationToken,
    delivered: AtomicU64,
}

impl ClientConnection {
    /// Wrap a sink under a freshly allocated id.
    pub fn new(sink: impl MessageSink + 'static) -> Self {
        Self::with_id(ConnectionId::next(), sink)
    }

    /// Wrap a sink under an id chosen by the caller.
    pub fn with_id(id: ConnectionId, sink: impl MessageSink + 'static) -> Self {
        Self {
            id,
            sink: Box::new(sink),
            connected_at: Instant::now(),
            closing: AtomicBool::new(false),
            closed: CancellationToken::new(),
            delivered: AtomicU64::new(0),
        }
    }

    /// Write one encoded frame to the client.
    ///
    /// Fails with [`RelayError::Closed`] once [`close`](Self::close) has run.
    pub async fn write(&self, frame: Arc<String>) -> Result<()> {
        if self.is_closed() {
            return Err(RelayError::Closed);
        }
        self.sink.send_text(frame).await?;
        let _ = self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Close the underlying channel. Only the first call reaches the sink.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        self.closed.cancel();
        self.sink.close().await;
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection has been closed from any side.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Frames successfully written to this client.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("delivered", &self.delivered_count())
            .finish_non_exhaustive()
    }
}
