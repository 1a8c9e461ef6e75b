//! In-memory transports for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::connection::{ClientConnection, MessageSink, MessageSource};
use crate::errors::{RelayError, Result};
use crate::message::FileMessage;

/// Sink that forwards frames into a channel and counts `close` calls.
pub(crate) struct ChannelSink {
    tx: mpsc::UnboundedSender<Arc<String>>,
    closes: Arc<AtomicUsize>,
}

impl ChannelSink {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Arc<String>>, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closes = Arc::new(AtomicUsize::new(0));
        (
            Self {
                tx,
                closes: closes.clone(),
            },
            rx,
            closes,
        )
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send_text(&self, frame: Arc<String>) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| RelayError::Write("receiver dropped".into()))
    }

    async fn close(&self) {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sink whose writes always fail.
pub(crate) struct FailingSink;

#[async_trait]
impl MessageSink for FailingSink {
    async fn send_text(&self, _frame: Arc<String>) -> Result<()> {
        Err(RelayError::Write("broken pipe".into()))
    }

    async fn close(&self) {}
}

/// Sink whose writes never complete.
pub(crate) struct StallingSink;

#[async_trait]
impl MessageSink for StallingSink {
    async fn send_text(&self, _frame: Arc<String>) -> Result<()> {
        futures::future::pending::<()>().await;
        Ok(())
    }

    async fn close(&self) {}
}

/// Sink that accepts writes but whose close never completes.
pub(crate) struct StuckCloseSink;

#[async_trait]
impl MessageSink for StuckCloseSink {
    async fn send_text(&self, _frame: Arc<String>) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {
        futures::future::pending::<()>().await;
    }
}

/// Source fed from a channel; a dropped sender reads as an orderly close.
pub(crate) struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Result<FileMessage>>,
}

impl ChannelSource {
    pub(crate) fn new() -> (mpsc::UnboundedSender<Result<FileMessage>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn next_message(&mut self) -> Result<FileMessage> {
        self.rx.recv().await.unwrap_or(Err(RelayError::Closed))
    }
}

/// A connection backed by [`ChannelSink`], plus the receiving end.
pub(crate) fn channel_connection() -> (
    Arc<ClientConnection>,
    mpsc::UnboundedReceiver<Arc<String>>,
) {
    let (sink, rx, _closes) = ChannelSink::new();
    (Arc::new(ClientConnection::new(sink)), rx)
}
