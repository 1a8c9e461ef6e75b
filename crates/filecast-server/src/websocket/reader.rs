//! Per-connection read loop.
//!
//! `Connected → Reading ⟲ → Closing → Closed`. Every way out of `Reading`
//! (bad payload, disconnect, transport fault, handle closed by the broadcast
//! loop, shutdown) goes through the same `Closing` step.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::connection::{ClientConnection, MessageSource};
use super::dispatch::DispatchSender;
use super::registry::ConnectionRegistry;
use crate::errors::RelayError;
use crate::metrics::{RELAY_DECODE_ERRORS_TOTAL, RELAY_MESSAGES_RECEIVED_TOTAL};

/// Where a [`Reader`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderPhase {
    /// Created, not yet registered.
    Connected,
    /// Registered and waiting for input.
    Reading,
    /// Deregistering and releasing the channel.
    Closing,
    /// Terminal.
    Closed,
}

/// Why a reader stopped and how much it forwarded.
#[derive(Debug)]
pub struct ReaderExit {
    /// The condition that ended the read loop.
    pub reason: RelayError,
    /// Messages pushed onto the dispatch queue.
    pub messages_read: u64,
}

/// Reads one client's messages and feeds them to the dispatch queue.
pub struct Reader<S> {
    connection: Arc<ClientConnection>,
    source: S,
    registry: Arc<ConnectionRegistry>,
    queue: DispatchSender,
    shutdown: CancellationToken,
    close_timeout: Duration,
    phase: ReaderPhase,
}

impl<S: MessageSource> Reader<S> {
    /// Create a reader for `connection`, reading from `source`.
    ///
    /// `close_timeout` bounds the final close of the connection, so a peer
    /// that stopped reading cannot hold the reader in `Closing`.
    pub fn new(
        connection: Arc<ClientConnection>,
        source: S,
        registry: Arc<ConnectionRegistry>,
        queue: DispatchSender,
        shutdown: CancellationToken,
        close_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            source,
            registry,
            queue,
            shutdown,
            close_timeout,
            phase: ReaderPhase::Connected,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ReaderPhase {
        self.phase
    }

    /// Register, read until the first failure, then tear down.
    ///
    /// Never returns an error: the failure that ended the loop is reported in
    /// [`ReaderExit::reason`].
    pub async fn run(&mut self) -> ReaderExit {
        if self.phase != ReaderPhase::Connected {
            return ReaderExit {
                reason: RelayError::Closed,
                messages_read: 0,
            };
        }

        let _ = self.registry.add(self.connection.clone()).await;
        self.phase = ReaderPhase::Reading;

        let mut messages_read = 0;
        let reason = self.read_loop(&mut messages_read).await;

        self.phase = ReaderPhase::Closing;
        let _ = self.registry.remove(self.connection.id).await;
        if tokio::time::timeout(self.close_timeout, self.connection.close())
            .await
            .is_err()
        {
            debug!(client_id = %self.connection.id, "close timed out");
        }
        self.phase = ReaderPhase::Closed;
        debug!(client_id = %self.connection.id, reason = reason.kind(), "reader closed");

        ReaderExit {
            reason,
            messages_read,
        }
    }

    async fn read_loop(&mut self, messages_read: &mut u64) -> RelayError {
        let id = self.connection.id;
        loop {
            let next = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return RelayError::Shutdown,
                () = self.connection.closed() => return RelayError::Closed,
                next = self.source.next_message() => next,
            };

            match next {
                Ok(message) => {
                    counter!(RELAY_MESSAGES_RECEIVED_TOTAL).increment(1);
                    if let Err(err) = self.queue.push(id, message) {
                        return err;
                    }
                    *messages_read += 1;
                }
                Err(err) => {
                    if let RelayError::Decode(ref e) = err {
                        counter!(RELAY_DECODE_ERRORS_TOTAL).increment(1);
                        warn!(client_id = %id, error = %e, "invalid message received");
                    }
                    return err;
                }
            }
        }
    }
}
