//! Record store collaborator.
//!
//! The hub's real persistence engine sits behind [`RecordStore`]; the
//! engine only needs identity lookup and an upsert whose write path
//! enforces one record per identity key. [`MemoryRecordStore`] backs tests
//! and the hub's in-process cache.

use async_trait::async_trait;
use lares_shared::record::DeviceRecord;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Uniqueness-enforcing record persistence.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<DeviceRecord>, StoreError>;

    /// Insert or replace the record for its identity key. Read-modify-write
    /// against the same identity must be atomic from the caller's view.
    async fn upsert(&self, record: DeviceRecord) -> Result<(), StoreError>;
}

/// In-memory store keyed by identity.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, DeviceRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<DeviceRecord>, StoreError> {
        Ok(self.records.read().await.get(identity).cloned())
    }

    async fn upsert(&self, record: DeviceRecord) -> Result<(), StoreError> {
        debug!("Upserting device record {}", record.identity);
        self.records
            .write()
            .await
            .insert(record.identity.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lares_shared::record::{DeviceOptions, Generation};

    fn record(identity: &str, host: &str) -> DeviceRecord {
        DeviceRecord {
            identity: identity.to_string(),
            host: host.to_string(),
            model: "SHSW-1".to_string(),
            generation: Generation::Gen1,
            sleep_period: 0,
            username: None,
            password: None,
            options: DeviceOptions::default(),
            paired_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_identity() {
        let store = MemoryRecordStore::new();
        store.upsert(record("AABBCCDDEEFF", "1.1.1.1")).await.unwrap();
        store.upsert(record("AABBCCDDEEFF", "2.2.2.2")).await.unwrap();

        assert_eq!(store.len().await, 1);
        let found = store.find_by_identity("AABBCCDDEEFF").await.unwrap();
        assert_eq!(found.unwrap().host, "2.2.2.2");
    }

    #[tokio::test]
    async fn test_find_missing() {
        let store = MemoryRecordStore::new();
        assert!(store.find_by_identity("FFFFFFFFFFFF").await.unwrap().is_none());
    }
}
