//! Local entity storage
//!
//! The local store owns every [`EntityRecord`]. Each write is consistent on
//! its own; there are no cross-entity transactions.

use crate::entity::{EntityKind, EntityRecord, Urn};
use crate::error::AppError;
use crate::sync::SyncStatus;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read/write access to entity records by URN
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get(&self, urn: &Urn) -> Result<Option<EntityRecord>, AppError>;

    /// Insert or replace the record stored under `record.urn`
    async fn put(&self, record: EntityRecord) -> Result<EntityRecord, AppError>;

    /// Remove a record, returning whether it existed
    async fn delete(&self, urn: &Urn) -> Result<bool, AppError>;

    /// All records (optionally of one kind), ordered by URN
    async fn list(&self, kind: Option<EntityKind>) -> Result<Vec<EntityRecord>, AppError>;

    async fn list_by_status(&self, status: SyncStatus) -> Result<Vec<EntityRecord>, AppError> {
        Ok(self
            .list(None)
            .await?
            .into_iter()
            .filter(|r| r.sync_status == status)
            .collect())
    }
}

/// In-memory store, used when no database is configured and in tests
pub struct MemoryEntityStore {
    records: Arc<RwLock<BTreeMap<Urn, EntityRecord>>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for MemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn get(&self, urn: &Urn) -> Result<Option<EntityRecord>, AppError> {
        let records = self.records.read().await;
        Ok(records.get(urn).cloned())
    }

    async fn put(&self, record: EntityRecord) -> Result<EntityRecord, AppError> {
        let mut records = self.records.write().await;
        records.insert(record.urn.clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, urn: &Urn) -> Result<bool, AppError> {
        let mut records = self.records.write().await;
        Ok(records.remove(urn).is_some())
    }

    async fn list(&self, kind: Option<EntityKind>) -> Result<Vec<EntityRecord>, AppError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityAttributes, EntitySnapshot};

    fn record(urn: &str, kind: EntityKind) -> EntityRecord {
        EntityRecord::new_local(
            Urn::from(urn),
            EntitySnapshot::new("x", None, EntityAttributes::empty(kind)),
        )
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryEntityStore::new();
        store.put(record("urn:li:tag:pii", EntityKind::Tag)).await.unwrap();

        let urn = Urn::from("urn:li:tag:pii");
        assert!(store.get(&urn).await.unwrap().is_some());
        assert!(store.delete(&urn).await.unwrap());
        assert!(!store.delete(&urn).await.unwrap());
        assert!(store.get(&urn).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = MemoryEntityStore::new();
        store.put(record("urn:li:tag:b", EntityKind::Tag)).await.unwrap();
        store.put(record("urn:li:tag:a", EntityKind::Tag)).await.unwrap();
        let mut domain = record("urn:li:domain:finance", EntityKind::Domain);
        domain.sync_status = SyncStatus::Synced;
        store.put(domain).await.unwrap();

        let tags = store.list(Some(EntityKind::Tag)).await.unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].urn.as_str(), "urn:li:tag:a");

        let synced = store.list_by_status(SyncStatus::Synced).await.unwrap();
        assert_eq!(synced.len(), 1);
        assert_eq!(synced[0].kind, EntityKind::Domain);
    }
}
