//! Durable Keyed Store
//!
//! The engine keeps no shared in-process state between requests; matches
//! and connection bindings live behind these traits. Writes to a match go
//! through a compare-and-swap on `version` so two concurrent actions can
//! never both land.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::game::state::{ConnectionRecord, MatchRecord, Role};

pub use memory::MemoryStore;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No record under this key.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Insert over an existing record.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// Conditional write lost to a concurrent writer.
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        /// Version the writer read.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// Backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Match persistence.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Fetch a match by id.
    async fn get_match(&self, match_id: &str) -> Result<Option<MatchRecord>, StoreError>;

    /// Insert a new match. Fails if the id is taken.
    async fn insert_match(&self, record: MatchRecord) -> Result<(), StoreError>;

    /// Overwrite a match only if the stored version equals `expected_version`.
    ///
    /// The whole record commits as one unit.
    async fn put_match_if_version(
        &self,
        record: MatchRecord,
        expected_version: u64,
    ) -> Result<(), StoreError>;

    /// Ids of all matches with status `active`.
    async fn list_active_matches(&self) -> Result<Vec<String>, StoreError>;
}

/// Connection persistence.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Create or replace a connection record.
    async fn put_connection(&self, record: ConnectionRecord) -> Result<(), StoreError>;

    /// Bind a connection to a match and role, keeping its other attributes.
    ///
    /// Creates the record with `fallback` if it is missing.
    async fn bind_connection(
        &self,
        connection_id: &str,
        match_id: &str,
        role: Role,
        fallback: ConnectionRecord,
    ) -> Result<ConnectionRecord, StoreError>;

    /// Fetch a live (unexpired) connection.
    async fn get_connection(&self, connection_id: &str) -> Result<Option<ConnectionRecord>, StoreError>;

    /// Remove a connection. Returns whether it existed.
    async fn delete_connection(&self, connection_id: &str) -> Result<bool, StoreError>;

    /// All live connections bound to a match.
    async fn connections_for_match(&self, match_id: &str) -> Result<Vec<ConnectionRecord>, StoreError>;
}
