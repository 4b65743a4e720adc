//! Sync-status reconciler
//!
//! Classifies the drift between the local copy of an entity and a freshly
//! fetched remote snapshot, and records the outcome on the stored entity.

use crate::entity::{EntityKind, EntityRecord, EntitySnapshot, EntityStore, Urn};
use crate::error::AppError;
use crate::sync::SyncStatus;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Status implied by a local/remote snapshot pair.
///
/// `previous` only matters when the remote is absent: an entity whose remote
/// copy was once confirmed becomes `REMOTE_DELETED`, anything else is
/// `LOCAL_ONLY`. A `PENDING_PUSH` that was never confirmed falls in the
/// second group.
pub fn reconcile(
    previous: SyncStatus,
    local: Option<&EntitySnapshot>,
    remote: Option<&EntitySnapshot>,
) -> SyncStatus {
    match (local, remote) {
        (None, None) => SyncStatus::NotSynced,
        (None, Some(_)) => SyncStatus::RemoteOnly,
        (Some(_), None) if previous.has_confirmed_remote() => SyncStatus::RemoteDeleted,
        (Some(_), None) => SyncStatus::LocalOnly,
        (Some(local), Some(remote)) if local.content_eq(remote) => SyncStatus::Synced,
        (Some(_), Some(_)) => SyncStatus::Modified,
    }
}

/// Persisting reconciler over the local store
pub struct Reconciler {
    store: Arc<dyn EntityStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Reconcile one entity against a raw remote snapshot and store the result.
    ///
    /// A malformed snapshot counts as no snapshot. The last-known remote
    /// copy is kept when the remote is absent, unless the entity resolves to
    /// `LOCAL_ONLY`.
    pub async fn reconcile_entity(&self, urn: &Urn, remote: Option<&Value>) -> Result<SyncStatus, AppError> {
        let existing = self.store.get(urn).await?;
        let kind = existing.as_ref().map(|r| r.kind).or_else(|| urn.kind());
        let remote = remote.and_then(|value| parse_remote(urn, kind, value));

        let Some(mut record) = existing else {
            return match remote {
                Some(snapshot) => {
                    let mut record = EntityRecord::new_remote(urn.clone(), snapshot);
                    record.last_synced_at = Some(Utc::now());
                    self.store.put(record).await?;
                    debug!("{} discovered remotely", urn);
                    Ok(SyncStatus::RemoteOnly)
                }
                None => Ok(SyncStatus::NotSynced),
            };
        };

        let status = reconcile(record.sync_status, record.local.as_ref(), remote.as_ref());

        if record.local.is_none() && remote.is_none() {
            // remote-only record whose remote vanished: nothing left to track
            self.store.delete(urn).await?;
            info!("{} disappeared remotely before import; record dropped", urn);
            return Ok(status);
        }

        if status != record.sync_status {
            info!("{}: {} -> {}", urn, record.sync_status, status);
        }

        let now = Utc::now();
        if let Some(snapshot) = remote {
            record.remote = Some(snapshot);
            record.last_synced_at = Some(now);
        } else if status == SyncStatus::LocalOnly {
            // never confirmed remotely
            record.remote = None;
        }
        record.sync_status = status;
        record.updated_at = now;
        self.store.put(record).await?;

        Ok(status)
    }
}

fn parse_remote(urn: &Urn, kind: Option<EntityKind>, value: &Value) -> Option<EntitySnapshot> {
    if value.is_null() {
        return None;
    }
    let Some(kind) = kind else {
        warn!("Ignoring remote snapshot for {}: unknown entity type", urn);
        return None;
    };
    match EntitySnapshot::from_remote(kind, value) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!("Ignoring remote snapshot for {}: {}", urn, e);
            None
        }
    }
}
