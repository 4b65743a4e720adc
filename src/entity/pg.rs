//! PostgreSQL-backed entity store
//!
//! Snapshots are stored as JSONB next to the status columns, with a content
//! checksum per side so drift can be queried directly in SQL.

use crate::entity::{EntityKind, EntityRecord, EntitySnapshot, EntityStore, Urn};
use crate::error::AppError;
use crate::sync::SyncStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde_json::Value;
use tokio_postgres::Row;
use tracing::{debug, info};

const SELECT_COLUMNS: &str =
    "urn, kind, local_snapshot, remote_snapshot, sync_status, last_synced_at, updated_at";

pub struct PgEntityStore {
    pool: Pool,
}

impl PgEntityStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the entity table and its indexes if they don't exist
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        let client = self.pool.get().await?;

        client
            .execute(
                "CREATE TABLE IF NOT EXISTS metadata_entities (
                    urn TEXT PRIMARY KEY,
                    kind VARCHAR(64) NOT NULL,
                    local_snapshot JSONB,
                    remote_snapshot JSONB,
                    local_checksum CHAR(64),
                    remote_checksum CHAR(64),
                    sync_status VARCHAR(32) NOT NULL DEFAULT 'NOT_SYNCED',
                    last_synced_at TIMESTAMPTZ,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
                &[],
            )
            .await?;

        client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_metadata_entities_kind ON metadata_entities(kind)",
                &[],
            )
            .await?;
        client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_metadata_entities_status ON metadata_entities(sync_status)",
                &[],
            )
            .await?;

        info!("Entity tables initialized");
        Ok(())
    }

    fn row_to_record(row: &Row) -> Result<EntityRecord, AppError> {
        EntityRow {
            urn: row.get(0),
            kind: row.get(1),
            local: row.get(2),
            remote: row.get(3),
            sync_status: row.get(4),
            last_synced_at: row.get(5),
            updated_at: row.get(6),
        }
        .into_record()
    }
}

/// Column values of one `metadata_entities` row
#[derive(Debug, Clone, PartialEq)]
struct EntityRow {
    urn: String,
    kind: String,
    local: Option<Value>,
    remote: Option<Value>,
    sync_status: String,
    last_synced_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl EntityRow {
    fn from_record(record: &EntityRecord) -> Result<Self, AppError> {
        Ok(Self {
            urn: record.urn.as_str().to_string(),
            kind: record.kind.entity_type().to_string(),
            local: record.local.as_ref().map(serde_json::to_value).transpose()?,
            remote: record.remote.as_ref().map(serde_json::to_value).transpose()?,
            sync_status: record.sync_status.as_str().to_string(),
            last_synced_at: record.last_synced_at,
            updated_at: record.updated_at,
        })
    }

    fn into_record(self) -> Result<EntityRecord, AppError> {
        Ok(EntityRecord {
            urn: Urn::new(self.urn),
            kind: self.kind.parse()?,
            local: self.local.map(serde_json::from_value::<EntitySnapshot>).transpose()?,
            remote: self.remote.map(serde_json::from_value::<EntitySnapshot>).transpose()?,
            sync_status: self.sync_status.parse()?,
            last_synced_at: self.last_synced_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn get(&self, urn: &Urn) -> Result<Option<EntityRecord>, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM metadata_entities WHERE urn = $1", SELECT_COLUMNS),
                &[&urn.as_str()],
            )
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn put(&self, record: EntityRecord) -> Result<EntityRecord, AppError> {
        let client = self.pool.get().await?;

        let row = EntityRow::from_record(&record)?;
        let local_checksum = record.local.as_ref().map(EntitySnapshot::checksum);
        let remote_checksum = record.remote.as_ref().map(EntitySnapshot::checksum);

        client
            .execute(
                "INSERT INTO metadata_entities
                    (urn, kind, local_snapshot, remote_snapshot, local_checksum, remote_checksum,
                     sync_status, last_synced_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (urn) DO UPDATE SET
                    kind = EXCLUDED.kind,
                    local_snapshot = EXCLUDED.local_snapshot,
                    remote_snapshot = EXCLUDED.remote_snapshot,
                    local_checksum = EXCLUDED.local_checksum,
                    remote_checksum = EXCLUDED.remote_checksum,
                    sync_status = EXCLUDED.sync_status,
                    last_synced_at = EXCLUDED.last_synced_at,
                    updated_at = EXCLUDED.updated_at",
                &[
                    &row.urn,
                    &row.kind,
                    &row.local,
                    &row.remote,
                    &local_checksum,
                    &remote_checksum,
                    &row.sync_status,
                    &row.last_synced_at,
                    &row.updated_at,
                ],
            )
            .await?;

        debug!("Stored {} as {}", record.urn, record.sync_status);
        Ok(record)
    }

    async fn delete(&self, urn: &Urn) -> Result<bool, AppError> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM metadata_entities WHERE urn = $1", &[&urn.as_str()])
            .await?;
        Ok(deleted > 0)
    }

    async fn list(&self, kind: Option<EntityKind>) -> Result<Vec<EntityRecord>, AppError> {
        let client = self.pool.get().await?;
        let rows = match kind {
            Some(kind) => {
                client
                    .query(
                        &format!(
                            "SELECT {} FROM metadata_entities WHERE kind = $1 ORDER BY urn",
                            SELECT_COLUMNS
                        ),
                        &[&kind.entity_type()],
                    )
                    .await?
            }
            None => {
                client
                    .query(
                        &format!("SELECT {} FROM metadata_entities ORDER BY urn", SELECT_COLUMNS),
                        &[],
                    )
                    .await?
            }
        };

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn list_by_status(&self, status: SyncStatus) -> Result<Vec<EntityRecord>, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM metadata_entities WHERE sync_status = $1 ORDER BY urn",
                    SELECT_COLUMNS
                ),
                &[&status.as_str()],
            )
            .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityAttributes;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record() -> EntityRecord {
        let mut record = EntityRecord::new_local(
            Urn::from("urn:li:glossaryTerm:revenue"),
            EntitySnapshot::new(
                "Revenue",
                Some("Recognized revenue".to_string()),
                EntityAttributes::GlossaryTerm {
                    parent_node: Some(Urn::from("urn:li:glossaryNode:finance")),
                    term_source: None,
                },
            ),
        );
        record.remote = Some(EntitySnapshot::new(
            "Revenue",
            None,
            EntityAttributes::empty(EntityKind::GlossaryTerm),
        ));
        record.sync_status = SyncStatus::RemoteDeleted;
        record.last_synced_at = Some(Utc::now());
        record
    }

    #[test]
    fn test_row_columns() {
        let row = EntityRow::from_record(&record()).unwrap();
        assert_eq!(row.urn, "urn:li:glossaryTerm:revenue");
        assert_eq!(row.kind, "glossaryTerm");
        assert_eq!(row.sync_status, "REMOTE_DELETED");
        assert_eq!(row.local.as_ref().unwrap()["attributes"]["parentNode"], "urn:li:glossaryNode:finance");
    }

    #[test]
    fn test_row_back_to_record() {
        let record = record();
        let restored = EntityRow::from_record(&record).unwrap().into_record().unwrap();
        assert_eq!(restored, record);

        let remote_only = EntityRecord::new_remote(
            Urn::from("urn:li:tag:pii"),
            EntitySnapshot::new("PII", None, EntityAttributes::empty(EntityKind::Tag)),
        );
        let restored = EntityRow::from_record(&remote_only).unwrap().into_record().unwrap();
        assert_eq!(restored.local, None);
        assert_eq!(restored.sync_status, SyncStatus::RemoteOnly);
    }

    #[test]
    fn test_bad_columns_are_rejected() {
        let mut row = EntityRow::from_record(&record()).unwrap();
        row.kind = "dataset".to_string();
        assert!(matches!(row.clone().into_record(), Err(AppError::Validation(_))));

        let mut row = EntityRow::from_record(&record()).unwrap();
        row.sync_status = "IN_FLIGHT".to_string();
        assert!(matches!(row.into_record(), Err(AppError::Validation(_))));

        let mut row = EntityRow::from_record(&record()).unwrap();
        row.local = Some(json!({ "description": "no name" }));
        assert!(matches!(row.into_record(), Err(AppError::Serialization(_))));
    }
}
