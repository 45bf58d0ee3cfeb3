//! In-memory store.
//!
//! Backs both store traits with BTreeMap tables behind `tokio::sync::RwLock`,
//! plus a match -> connections index standing in for the secondary index
//! a hosted table would provide. Connection expiry is enforced here, not by
//! the engine: expired records are invisible to reads and dropped by
//! [`MemoryStore::purge_expired`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::now_millis;
use crate::game::state::{ConnectionId, ConnectionRecord, MatchId, MatchRecord, MatchStatus, Role};
use crate::store::{ConnectionStore, MatchStore, StoreError};

/// Clock used for expiry checks (Unix ms).
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Default)]
struct ConnectionTable {
    records: BTreeMap<ConnectionId, ConnectionRecord>,
    by_match: BTreeMap<MatchId, BTreeSet<ConnectionId>>,
}

impl ConnectionTable {
    fn unindex(&mut self, record: &ConnectionRecord) {
        if let Some(match_id) = &record.match_id {
            if let Some(ids) = self.by_match.get_mut(match_id) {
                ids.remove(&record.connection_id);
                if ids.is_empty() {
                    self.by_match.remove(match_id);
                }
            }
        }
    }

    fn index(&mut self, record: &ConnectionRecord) {
        if let Some(match_id) = &record.match_id {
            self.by_match
                .entry(match_id.clone())
                .or_default()
                .insert(record.connection_id.clone());
        }
    }

    fn upsert(&mut self, record: ConnectionRecord) {
        if let Some(old) = self.records.remove(&record.connection_id) {
            self.unindex(&old);
        }
        self.index(&record);
        self.records.insert(record.connection_id.clone(), record);
    }

    fn remove(&mut self, connection_id: &str) -> Option<ConnectionRecord> {
        let old = self.records.remove(connection_id)?;
        self.unindex(&old);
        Some(old)
    }
}

/// In-memory implementation of [`MatchStore`] and [`ConnectionStore`].
pub struct MemoryStore {
    matches: RwLock<BTreeMap<MatchId, MatchRecord>>,
    connections: RwLock<ConnectionTable>,
    clock: Clock,
}

impl MemoryStore {
    /// Create an empty store using the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(now_millis))
    }

    /// Create an empty store with a custom clock.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            matches: RwLock::new(BTreeMap::new()),
            connections: RwLock::new(ConnectionTable::default()),
            clock,
        }
    }

    /// Drop every expired connection record. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = (self.clock)();
        let mut table = self.connections.write().await;

        let expired: Vec<ConnectionId> = table
            .records
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.connection_id.clone())
            .collect();

        for id in &expired {
            table.remove(id);
        }

        if !expired.is_empty() {
            debug!("Purged {} expired connections", expired.len());
        }
        expired.len()
    }

    /// Number of stored matches.
    pub async fn match_count(&self) -> usize {
        self.matches.read().await.len()
    }

    /// Number of stored connection records, expired or not.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.records.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn get_match(&self, match_id: &str) -> Result<Option<MatchRecord>, StoreError> {
        Ok(self.matches.read().await.get(match_id).cloned())
    }

    async fn insert_match(&self, record: MatchRecord) -> Result<(), StoreError> {
        let mut matches = self.matches.write().await;
        if matches.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        matches.insert(record.id.clone(), record);
        Ok(())
    }

    async fn put_match_if_version(
        &self,
        record: MatchRecord,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let mut matches = self.matches.write().await;
        let stored = matches
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::NotFound(record.id.clone()))?;

        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual: stored.version,
            });
        }

        *stored = record;
        Ok(())
    }

    async fn list_active_matches(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .matches
            .read()
            .await
            .values()
            .filter(|m| m.status == MatchStatus::Active)
            .map(|m| m.id.clone())
            .collect())
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn put_connection(&self, record: ConnectionRecord) -> Result<(), StoreError> {
        self.connections.write().await.upsert(record);
        Ok(())
    }

    async fn bind_connection(
        &self,
        connection_id: &str,
        match_id: &str,
        role: Role,
        fallback: ConnectionRecord,
    ) -> Result<ConnectionRecord, StoreError> {
        let now = (self.clock)();
        let mut table = self.connections.write().await;

        let mut record = match table.records.get(connection_id) {
            Some(existing) if !existing.is_expired(now) => existing.clone(),
            _ => fallback,
        };
        record.connection_id = connection_id.to_string();
        record.match_id = Some(match_id.to_string());
        record.role = Some(role);

        table.upsert(record.clone());
        Ok(record)
    }

    async fn get_connection(&self, connection_id: &str) -> Result<Option<ConnectionRecord>, StoreError> {
        let now = (self.clock)();
        Ok(self
            .connections
            .read()
            .await
            .records
            .get(connection_id)
            .filter(|r| !r.is_expired(now))
            .cloned())
    }

    async fn delete_connection(&self, connection_id: &str) -> Result<bool, StoreError> {
        Ok(self.connections.write().await.remove(connection_id).is_some())
    }

    async fn connections_for_match(&self, match_id: &str) -> Result<Vec<ConnectionRecord>, StoreError> {
        let now = (self.clock)();
        let table = self.connections.read().await;

        Ok(table
            .by_match
            .get(match_id)
            .into_iter()
            .flatten()
            .filter_map(|id| table.records.get(id))
            .filter(|r| !r.is_expired(now))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use crate::game::registry::ModuleRegistry;
    use crate::game::state::NewMatch;

    fn record(id: &str) -> MatchRecord {
        MatchRecord::create(NewMatch::single(id, "seed", "glyphOrder"), &ModuleRegistry::builtin(), 0)
            .unwrap()
    }

    fn manual_clock(start: i64) -> (Arc<AtomicI64>, Clock) {
        let now = Arc::new(AtomicI64::new(start));
        let handle = now.clone();
        (now, Arc::new(move || handle.load(Ordering::SeqCst)))
    }

    #[tokio::test]
    async fn test_insert_and_get_match() {
        let store = MemoryStore::new();
        store.insert_match(record("m1")).await.unwrap();

        assert_eq!(store.get_match("m1").await.unwrap().unwrap().id, "m1");
        assert!(store.get_match("m2").await.unwrap().is_none());
        assert_eq!(
            store.insert_match(record("m1")).await,
            Err(StoreError::AlreadyExists("m1".to_string()))
        );
        assert_eq!(store.match_count().await, 1);
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = MemoryStore::new();
        store.insert_match(record("m1")).await.unwrap();

        let mut next = record("m1");
        next.version = 1;
        store.put_match_if_version(next.clone(), 0).await.unwrap();

        // A second writer that also read version 0 loses
        let mut stale = record("m1");
        stale.version = 1;
        stale.strikes = 2;
        assert_eq!(
            store.put_match_if_version(stale, 0).await,
            Err(StoreError::VersionConflict { expected: 0, actual: 1 })
        );
        assert_eq!(store.get_match("m1").await.unwrap().unwrap(), next);
    }

    #[tokio::test]
    async fn test_put_missing_match() {
        let store = MemoryStore::new();
        let result = store.put_match_if_version(record("ghost"), 0).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_active_matches() {
        let store = MemoryStore::new();
        store.insert_match(record("m1")).await.unwrap();
        let mut done = record("m2");
        done.status = MatchStatus::Completed;
        store.insert_match(done).await.unwrap();

        assert_eq!(store.list_active_matches().await.unwrap(), vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn test_bind_keeps_connected_at() {
        let (_, clock) = manual_clock(5_000);
        let store = MemoryStore::with_clock(clock);
        store.put_connection(ConnectionRecord::open("c1", 5_000, 60)).await.unwrap();

        let bound = store
            .bind_connection("c1", "m1", Role::Player, ConnectionRecord::open("c1", 9_999, 60))
            .await
            .unwrap();
        assert_eq!(bound.connected_at, 5_000);
        assert_eq!(bound.match_id.as_deref(), Some("m1"));
        assert_eq!(bound.role, Some(Role::Player));
    }

    #[tokio::test]
    async fn test_rebind_moves_index() {
        let (_, clock) = manual_clock(0);
        let store = MemoryStore::with_clock(clock);
        let fallback = ConnectionRecord::open("c1", 0, 60);

        store.bind_connection("c1", "m1", Role::Player, fallback.clone()).await.unwrap();
        store.bind_connection("c1", "m2", Role::Spectator, fallback).await.unwrap();

        assert!(store.connections_for_match("m1").await.unwrap().is_empty());
        let m2 = store.connections_for_match("m2").await.unwrap();
        assert_eq!(m2.len(), 1);
        assert_eq!(m2[0].role, Some(Role::Spectator));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .bind_connection("c1", "m1", Role::Player, ConnectionRecord::open("c1", now_millis(), 60))
            .await
            .unwrap();

        assert!(store.delete_connection("c1").await.unwrap());
        assert!(!store.delete_connection("c1").await.unwrap());
        assert!(store.connections_for_match("m1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_connections_hidden_and_purged() {
        let (now, clock) = manual_clock(0);
        let store = MemoryStore::with_clock(clock);
        store
            .bind_connection("c1", "m1", Role::Player, ConnectionRecord::open("c1", 0, 10))
            .await
            .unwrap();

        assert_eq!(store.connections_for_match("m1").await.unwrap().len(), 1);

        now.store(10_000, Ordering::SeqCst);
        assert!(store.get_connection("c1").await.unwrap().is_none());
        assert!(store.connections_for_match("m1").await.unwrap().is_empty());

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.connection_count().await, 0);
    }
}
