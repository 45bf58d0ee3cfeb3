//! Broadcast Fan-out
//!
//! Pushes one frame to every connection bound to a match. Sends run
//! concurrently and independently; a recipient the provider reports as gone
//! is pruned from the connection store, any other failure is logged and
//! left alone.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn, instrument};

use crate::network::protocol::ServerFrame;
use crate::network::push::{PushChannel, PushError};
use crate::store::{ConnectionStore, StoreError};

/// Per-broadcast delivery tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Frames handed to the provider.
    pub delivered: usize,
    /// Gone recipients removed from the store.
    pub pruned: usize,
    /// Recipients that failed for any other reason.
    pub failed: usize,
}

impl BroadcastReport {
    /// Number of recipients attempted.
    pub fn attempted(&self) -> usize {
        self.delivered + self.pruned + self.failed
    }
}

/// Fan-out over a push channel.
#[derive(Clone)]
pub struct Broadcaster {
    connections: Arc<dyn ConnectionStore>,
    push: Arc<dyn PushChannel>,
}

impl Broadcaster {
    /// Create a broadcaster.
    pub fn new(connections: Arc<dyn ConnectionStore>, push: Arc<dyn PushChannel>) -> Self {
        Self { connections, push }
    }

    /// Deliver `frame` to every connection bound to `match_id`.
    ///
    /// Only a failure to resolve the subscriber set is an error; per-recipient
    /// failures are reflected in the report.
    #[instrument(skip(self, frame))]
    pub async fn broadcast(&self, match_id: &str, frame: &ServerFrame) -> Result<BroadcastReport, StoreError> {
        let subscribers = self.connections.connections_for_match(match_id).await?;

        let sends = subscribers.iter().map(|conn| async move {
            let outcome = self.push.post(&conn.connection_id, frame).await;
            (conn.connection_id.as_str(), outcome)
        });

        let mut report = BroadcastReport::default();
        for (connection_id, outcome) in join_all(sends).await {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(PushError::Gone(_)) => {
                    debug!("Stale connection: {}", connection_id);
                    if let Err(e) = self.connections.delete_connection(connection_id).await {
                        warn!("Failed to prune {}: {}", connection_id, e);
                    }
                    report.pruned += 1;
                }
                Err(PushError::Failure(e)) => {
                    warn!("Failed to send to {}: {}", connection_id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Deliver `frame` to a single connection.
    ///
    /// Unlike [`broadcast`](Self::broadcast), a gone recipient is returned to
    /// the caller instead of being pruned.
    pub async fn send_to_one(&self, connection_id: &str, frame: &ServerFrame) -> Result<(), PushError> {
        self.push.post(connection_id, frame).await
    }
}
