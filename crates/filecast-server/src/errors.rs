//! Relay error types.

use std::time::Duration;

use thiserror::Error;

/// Every failure the relay distinguishes.
///
/// Reader-side variants (`Decode`, `Read`, `Closed`, `QueueClosed`,
/// `Shutdown`) end the connection's reader. Writer-side variants (`Write`,
/// `WriteTimeout`, `Closed`) get the handle removed from the registry. None of
/// them stop the process; only `Bind` is fatal to the binary.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Inbound payload was not a well-formed `{content, fileExtension}` object.
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),
    /// Transport fault while reading.
    #[error("read failed: {0}")]
    Read(String),
    /// Transport fault while writing.
    #[error("write failed: {0}")]
    Write(String),
    /// A single write exceeded the configured bound.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
    /// The peer closed the connection, or the handle was already closed.
    #[error("connection closed")]
    Closed,
    /// The broadcast loop is gone and cannot accept more messages.
    #[error("dispatch queue closed")]
    QueueClosed,
    /// Process shutdown was requested.
    #[error("shutting down")]
    Shutdown,
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// `listen` was called on a server that is already running.
    #[error("server is already listening")]
    AlreadyListening,
}

impl RelayError {
    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Read(_) => "read",
            Self::Write(_) => "write",
            Self::WriteTimeout(_) => "write_timeout",
            Self::Closed => "closed",
            Self::QueueClosed => "queue_closed",
            Self::Shutdown => "shutdown",
            Self::Bind { .. } => "bind",
            Self::AlreadyListening => "already_listening",
        }
    }

    pub(crate) fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
