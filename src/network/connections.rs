//! Connection Registry
//!
//! Binds push-channel connections to matches. Joining is the only point a
//! full match snapshot is sent; every later update is a diff.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::core::now_millis;
use crate::game::machine::EngineError;
use crate::game::state::{ConnectionRecord, Role};
use crate::network::broadcast::Broadcaster;
use crate::network::protocol::ServerFrame;
use crate::network::push::PushError;
use crate::store::{ConnectionStore, MatchStore, StoreError};

/// Errors from connection lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Engine-level rejection (e.g. unknown match).
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Snapshot could not be delivered.
    #[error("snapshot delivery failed: {0}")]
    Push(#[from] PushError),
}

/// Connection lifecycle and lookup.
#[derive(Clone)]
pub struct ConnectionRegistry {
    matches: Arc<dyn MatchStore>,
    connections: Arc<dyn ConnectionStore>,
    broadcaster: Broadcaster,
    ttl_secs: i64,
}

impl ConnectionRegistry {
    /// Create a registry. Records expire `ttl_secs` after open.
    pub fn new(
        matches: Arc<dyn MatchStore>,
        connections: Arc<dyn ConnectionStore>,
        broadcaster: Broadcaster,
        ttl_secs: i64,
    ) -> Self {
        Self { matches, connections, broadcaster, ttl_secs }
    }

    /// Record a freshly opened, unbound connection.
    pub async fn open(&self, connection_id: &str) -> Result<ConnectionRecord, StoreError> {
        let record = ConnectionRecord::open(connection_id, now_millis(), self.ttl_secs);
        self.connections.put_connection(record.clone()).await?;
        debug!("Connection {} opened", connection_id);
        Ok(record)
    }

    /// Bind a connection to a match and push it the current snapshot.
    ///
    /// Idempotent; re-joining overwrites any earlier binding. Returns the
    /// version carried by the snapshot.
    #[instrument(skip(self))]
    pub async fn join(&self, connection_id: &str, match_id: &str, role: Role) -> Result<u64, ConnectionError> {
        let fallback = ConnectionRecord::open(connection_id, now_millis(), self.ttl_secs);
        self.connections
            .bind_connection(connection_id, match_id, role, fallback)
            .await?;

        let record = self
            .matches
            .get_match(match_id)
            .await?
            .ok_or_else(|| EngineError::MatchNotFound(match_id.to_string()))?;

        let snapshot = ServerFrame::state(match_id, record.version, record.snapshot());
        self.broadcaster.send_to_one(connection_id, &snapshot).await?;

        info!("Connection {} joined match {} as {:?} at v{}", connection_id, match_id, role, record.version);
        Ok(record.version)
    }

    /// Remove a connection record entirely. Idempotent.
    pub async fn unbind(&self, connection_id: &str) -> Result<(), StoreError> {
        if self.connections.delete_connection(connection_id).await? {
            debug!("Connection {} removed", connection_id);
        }
        Ok(())
    }

    /// Every connection currently bound to a match, both roles, any order.
    pub async fn subscribers_of(&self, match_id: &str) -> Result<Vec<ConnectionRecord>, StoreError> {
        self.connections.connections_for_match(match_id).await
    }
}
