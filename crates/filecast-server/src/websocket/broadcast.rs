//! Message fan-out to connected WebSocket clients.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::{ClientConnection, ConnectionId};
use super::dispatch::DispatchReceiver;
use super::registry::ConnectionRegistry;
use crate::errors::{RelayError, Result};
use crate::message::FileMessage;
use crate::metrics::{
    RELAY_BROADCAST_DURATION_SECONDS, RELAY_BROADCASTS_TOTAL, RELAY_DELIVERIES_TOTAL,
    RELAY_DELIVERY_FAILURES_TOTAL,
};

/// Outcome of one broadcast pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Handles in the snapshot.
    pub recipients: usize,
    /// Handles that accepted the frame.
    pub delivered: usize,
    /// Handles whose write failed and that were dropped.
    pub failed: Vec<ConnectionId>,
}

/// The single consumer of the dispatch queue.
///
/// Broadcasts run strictly one after another, so no client ever sees frames
/// from two broadcasts interleaved. A failed or timed-out write removes that
/// client and moves on to the next one.
pub struct BroadcastLoop {
    registry: Arc<ConnectionRegistry>,
    queue: DispatchReceiver,
    write_timeout: Duration,
}

impl BroadcastLoop {
    /// Create a loop draining `queue` into every member of `registry`.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        queue: DispatchReceiver,
        write_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            queue,
            write_timeout,
        }
    }

    /// Process messages in arrival order until shutdown or until every
    /// producer is gone. Returns the number of broadcasts performed.
    ///
    /// Messages still queued at shutdown are dropped.
    pub async fn run(mut self, shutdown: CancellationToken) -> u64 {
        info!("broadcast loop started");
        let mut broadcasts = 0;
        loop {
            let envelope = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                next = self.queue.recv() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            debug!(origin = %envelope.origin, "dequeued message");
            let _ = self.broadcast(&envelope.message).await;
            broadcasts += 1;
        }
        info!(broadcasts, dropped = self.queue.len(), "broadcast loop stopped");
        broadcasts
    }

    /// Deliver `message` to every registered client.
    pub async fn broadcast(&self, message: &FileMessage) -> BroadcastReport {
        let started = Instant::now();
        let frame = match message.encode() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize message");
                return BroadcastReport::default();
            }
        };

        let snapshot = self.registry.snapshot().await;
        let mut report = BroadcastReport {
            recipients: snapshot.len(),
            ..BroadcastReport::default()
        };

        for conn in &snapshot {
            match self.deliver(conn, frame.clone()).await {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(client_id = %conn.id, error = %err, "delivery failed, dropping client");
                    counter!(RELAY_DELIVERY_FAILURES_TOTAL, "reason" => err.kind()).increment(1);
                    self.drop_client(conn).await;
                    report.failed.push(conn.id);
                }
            }
        }

        counter!(RELAY_BROADCASTS_TOTAL).increment(1);
        counter!(RELAY_DELIVERIES_TOTAL).increment(report.delivered as u64);
        histogram!(RELAY_BROADCAST_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        debug!(
            recipients = report.recipients,
            delivered = report.delivered,
            failed = report.failed.len(),
            "broadcast complete"
        );
        report
    }

    async fn deliver(&self, conn: &ClientConnection, frame: Arc<String>) -> Result<()> {
        match tokio::time::timeout(self.write_timeout, conn.write(frame)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::WriteTimeout(self.write_timeout)),
        }
    }

    /// Remove a client after a failed write. Only the removal that wins
    /// closes the channel.
    async fn drop_client(&self, conn: &ClientConnection) {
        if !self.registry.remove(conn.id).await {
            return;
        }
        if tokio::time::timeout(self.write_timeout, conn.close()).await.is_err() {
            debug!(client_id = %conn.id, "close timed out");
        }
    }
}
