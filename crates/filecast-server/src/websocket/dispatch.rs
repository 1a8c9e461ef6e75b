//! Hand-off between per-connection readers and the broadcast loop.
//!
//! Unbounded, FIFO, many producers and exactly one consumer. Pushing never
//! waits, so a reader is only ever blocked on its own socket.

use tokio::sync::mpsc;

use super::connection::ConnectionId;
use crate::errors::{RelayError, Result};
use crate::message::FileMessage;

/// A decoded message tagged with the connection that sent it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Sending connection, for logging only.
    pub origin: ConnectionId,
    /// The message to broadcast.
    pub message: FileMessage,
}

/// Create a connected sender/receiver pair.
pub fn dispatch_queue() -> (DispatchSender, DispatchReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DispatchSender { tx }, DispatchReceiver { rx })
}

/// Producer side, cloned into every reader.
#[derive(Clone, Debug)]
pub struct DispatchSender {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl DispatchSender {
    /// Enqueue a message. Fails only once the receiver has been dropped.
    pub fn push(&self, origin: ConnectionId, message: FileMessage) -> Result<()> {
        self.tx
            .send(Envelope { origin, message })
            .map_err(|_| RelayError::QueueClosed)
    }

    /// Whether the consumer is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by the broadcast loop.
#[derive(Debug)]
pub struct DispatchReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl DispatchReceiver {
    /// Wait for the oldest queued message. `None` once every sender is gone
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Messages currently waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
