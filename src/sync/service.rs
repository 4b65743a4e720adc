//! Sync service
//!
//! Pull, import and push actions over the local store, plus the local
//! editing helpers that keep sync status consistent with edits.

use crate::catalog::RemoteCatalog;
use crate::entity::{EntityKind, EntityRecord, EntitySnapshot, EntityStore, Urn};
use crate::error::{not_found_error, AppError};
use crate::pipeline::{EntityChanges, EntityInput, Operation, OperationDescriptor, OperationResult, OperationRouter};
use crate::sync::{reconcile, Reconciler, SyncStatus};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// A URN that could not be pulled
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullFailure {
    pub urn: Urn,
    pub error: String,
}

/// Outcome of a pull: resulting statuses and per-URN failures
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    pub pulled: usize,
    pub statuses: BTreeMap<SyncStatus, usize>,
    pub errors: Vec<PullFailure>,
}

impl PullReport {
    pub fn count(&self, status: SyncStatus) -> usize {
        self.statuses.get(&status).copied().unwrap_or(0)
    }
}

pub struct SyncService {
    store: Arc<dyn EntityStore>,
    catalog: Arc<dyn RemoteCatalog>,
    reconciler: Reconciler,
}

impl SyncService {
    pub fn new(store: Arc<dyn EntityStore>, catalog: Arc<dyn RemoteCatalog>) -> Self {
        Self {
            reconciler: Reconciler::new(store.clone()),
            store,
            catalog,
        }
    }

    /// Fetch and reconcile each URN in turn.
    /// Connectivity failures are reported per URN and leave the record untouched.
    pub async fn pull(&self, urns: &[Urn]) -> Result<PullReport, AppError> {
        let mut report = PullReport::default();

        for urn in urns {
            let remote = match self.catalog.fetch_entity(urn).await {
                Ok(remote) => remote,
                Err(e) => {
                    warn!("Failed to fetch {}: {}", urn, e);
                    report.errors.push(PullFailure {
                        urn: urn.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let status = self.reconciler.reconcile_entity(urn, remote.as_ref()).await?;
            *report.statuses.entry(status).or_insert(0) += 1;
            report.pulled += 1;
        }

        info!("Pulled {} entities ({} errors)", report.pulled, report.errors.len());
        Ok(report)
    }

    /// Pull everything the catalog lists plus every local record, for one kind or all
    pub async fn pull_all(&self, kind: Option<EntityKind>) -> Result<PullReport, AppError> {
        let kinds = match kind {
            Some(kind) => vec![kind],
            None => EntityKind::ALL.to_vec(),
        };

        let mut urns = BTreeSet::new();
        for kind in kinds {
            urns.extend(self.catalog.list_entities(kind).await?);
        }
        urns.extend(self.store.list(kind).await?.into_iter().map(|r| r.urn));

        let urns: Vec<Urn> = urns.into_iter().collect();
        self.pull(&urns).await
    }

    /// Replace the local copy with the last-known remote snapshot
    pub async fn import(&self, urn: &Urn) -> Result<EntityRecord, AppError> {
        let mut record = self.require(urn).await?;

        if !matches!(
            record.sync_status,
            SyncStatus::RemoteOnly | SyncStatus::Modified | SyncStatus::Synced
        ) {
            return Err(AppError::Conflict(format!(
                "{} is {} and cannot be imported",
                urn, record.sync_status
            )));
        }
        let remote = record
            .remote
            .clone()
            .ok_or_else(|| AppError::Conflict(format!("No remote snapshot known for {}", urn)))?;

        record.local = Some(remote);
        record.sync_status = SyncStatus::Synced;
        record.updated_at = Utc::now();
        info!("Imported {} from remote", urn);
        self.store.put(record).await
    }

    /// Route the local copy to the remote catalog through `router`.
    ///
    /// Without a confirmed remote copy the push is a create, otherwise an
    /// update of the fields that differ. A create drops any stale remote
    /// snapshot, so a pending push that still has one was an update.
    /// A successful or queued push marks the record `PENDING_PUSH`; a failed
    /// one leaves it as it was.
    pub async fn push(&self, urn: &Urn, router: &mut OperationRouter) -> Result<OperationResult, AppError> {
        let mut record = self.require(urn).await?;
        let local = record
            .local
            .clone()
            .ok_or_else(|| AppError::BadRequest(format!("{} has no local copy to push", urn)))?;

        let remote_exists = matches!(
            record.sync_status,
            SyncStatus::Synced | SyncStatus::Modified | SyncStatus::PendingPush
        );
        let operation = match &record.remote {
            Some(remote) if remote_exists => {
                let changes = diff(&local, remote);
                if changes.is_empty() {
                    return Err(AppError::BadRequest(format!("{} has no local changes to push", urn)));
                }
                Operation::Update {
                    urn: urn.clone(),
                    changes,
                }
            }
            _ => Operation::Create {
                kind: record.kind,
                urn: Some(urn.clone()),
                input: EntityInput {
                    id: None,
                    name: local.name.clone(),
                    description: local.description.clone(),
                    attributes: Some(local.attributes.clone()),
                    owners: Vec::new(),
                },
            },
        };

        let creating = matches!(operation, Operation::Create { .. });
        let result = router.submit(OperationDescriptor::new(operation)).await;
        if result.success {
            if creating {
                // any remaining snapshot predates a remote deletion
                record.remote = None;
            }
            record.sync_status = SyncStatus::PendingPush;
            record.updated_at = Utc::now();
            self.store.put(record).await?;
            info!("Push of {} {}", urn, if result.queued { "queued" } else { "sent" });
        } else {
            warn!("Push of {} failed: {}", urn, result.error.as_deref().unwrap_or("unknown error"));
        }
        Ok(result)
    }

    /// Number of records in each status, every status included
    pub async fn status_summary(&self) -> Result<BTreeMap<SyncStatus, usize>, AppError> {
        let mut summary: BTreeMap<SyncStatus, usize> = SyncStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for record in self.store.list(None).await? {
            *summary.entry(record.sync_status).or_insert(0) += 1;
        }
        Ok(summary)
    }

    /// Create or edit the local copy of an entity.
    ///
    /// New records start `NOT_SYNCED`. Edits to a record whose remote content
    /// is tracked are re-compared against the last-known remote snapshot.
    pub async fn upsert_local(&self, urn: Option<Urn>, snapshot: EntitySnapshot) -> Result<EntityRecord, AppError> {
        let kind = snapshot.kind();
        if snapshot.name.trim().is_empty() {
            return Err(AppError::Validation("Entity name cannot be blank".to_string()));
        }

        let urn = match urn {
            Some(urn) => {
                urn.ensure_kind(kind)?;
                urn
            }
            None => Urn::for_entity(kind, &Uuid::new_v4().to_string()),
        };

        let record = match self.store.get(&urn).await? {
            None => EntityRecord::new_local(urn, snapshot),
            Some(mut record) => {
                if record.sync_status.tracks_remote_content() && record.remote.is_some() {
                    record.sync_status = reconcile(record.sync_status, Some(&snapshot), record.remote.as_ref());
                }
                record.local = Some(snapshot);
                record.updated_at = Utc::now();
                record
            }
        };

        self.store.put(record).await
    }

    pub async fn delete_local(&self, urn: &Urn) -> Result<bool, AppError> {
        self.store.delete(urn).await
    }

    pub async fn get(&self, urn: &Urn) -> Result<Option<EntityRecord>, AppError> {
        self.store.get(urn).await
    }

    pub async fn list(&self, kind: Option<EntityKind>) -> Result<Vec<EntityRecord>, AppError> {
        self.store.list(kind).await
    }

    async fn require(&self, urn: &Urn) -> Result<EntityRecord, AppError> {
        self.store
            .get(urn)
            .await?
            .ok_or_else(|| not_found_error(format!("Entity {} not found", urn)))
    }
}

/// Field changes that turn `remote` into `local`
fn diff(local: &EntitySnapshot, remote: &EntitySnapshot) -> EntityChanges {
    let mut changes = EntityChanges::default();
    if local.name.trim() != remote.name.trim() {
        changes.name = Some(local.name.clone());
    }
    let description = |s: &EntitySnapshot| s.description.as_deref().map(str::trim).unwrap_or("").to_string();
    if description(local) != description(remote) {
        changes.description = Some(description(local));
    }
    if !local.content_eq(&EntitySnapshot::new(local.name.clone(), local.description.clone(), remote.attributes.clone())) {
        changes.attributes = Some(local.attributes.clone());
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::entity::{EntityAttributes, MemoryEntityStore};
    use crate::pipeline::{OperationKind, RouterConfig};
    use pretty_assertions::assert_eq;

    struct Fixture {
        service: SyncService,
        catalog: Arc<InMemoryCatalog>,
        router: OperationRouter,
    }

    fn fixture(sync_mode: bool) -> Fixture {
        let store = Arc::new(MemoryEntityStore::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let router = OperationRouter::new(
            RouterConfig {
                sync_mode,
                ..Default::default()
            },
            catalog.clone(),
        );
        Fixture {
            service: SyncService::new(store, catalog.clone()),
            catalog,
            router,
        }
    }

    fn tag(name: &str) -> EntitySnapshot {
        EntitySnapshot::new(name, None, EntityAttributes::empty(EntityKind::Tag))
    }

    #[tokio::test]
    async fn test_pull_all_classifies_everything() {
        let f = fixture(true);
        f.catalog.seed(Urn::from("urn:li:tag:remote"), tag("Remote")).await;
        f.catalog.seed(Urn::from("urn:li:tag:both"), tag("Both")).await;
        f.service.upsert_local(Some(Urn::from("urn:li:tag:both")), tag("Both")).await.unwrap();
        f.service.upsert_local(Some(Urn::from("urn:li:tag:local")), tag("Local")).await.unwrap();

        let report = f.service.pull_all(Some(EntityKind::Tag)).await.unwrap();
        assert_eq!(report.pulled, 3);
        assert_eq!(report.count(SyncStatus::RemoteOnly), 1);
        assert_eq!(report.count(SyncStatus::Synced), 1);
        assert_eq!(report.count(SyncStatus::LocalOnly), 1);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_pull_connectivity_error_leaves_record() {
        let f = fixture(true);
        let urn = Urn::from("urn:li:tag:pii");
        f.service.upsert_local(Some(urn.clone()), tag("PII")).await.unwrap();
        f.catalog.set_unreachable(true);

        let report = f.service.pull(&[urn.clone()]).await.unwrap();
        assert_eq!(report.pulled, 0);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(f.service.get(&urn).await.unwrap().unwrap().sync_status, SyncStatus::NotSynced);
    }

    #[tokio::test]
    async fn test_import_remote_only() {
        let f = fixture(true);
        let urn = Urn::from("urn:li:tag:remote");
        f.catalog.seed(urn.clone(), tag("Remote")).await;
        f.service.pull(&[urn.clone()]).await.unwrap();

        let record = f.service.import(&urn).await.unwrap();
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.local, Some(tag("Remote")));

        assert!(matches!(
            f.service.import(&Urn::from("urn:li:tag:nothing")).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_push_then_pull_confirms() {
        let mut f = fixture(true);
        let urn = Urn::from("urn:li:tag:pii");
        f.service.upsert_local(Some(urn.clone()), tag("PII")).await.unwrap();

        let result = f.service.push(&urn, &mut f.router).await.unwrap();
        assert!(result.success);
        assert_eq!(f.service.get(&urn).await.unwrap().unwrap().sync_status, SyncStatus::PendingPush);

        let report = f.service.pull(&[urn.clone()]).await.unwrap();
        assert_eq!(report.count(SyncStatus::Synced), 1);
    }

    #[tokio::test]
    async fn test_edit_after_sync_pushes_update() {
        let mut f = fixture(false);
        let urn = Urn::from("urn:li:tag:pii");
        f.catalog.seed(urn.clone(), tag("PII")).await;
        f.service.pull(&[urn.clone()]).await.unwrap();
        f.service.import(&urn).await.unwrap();

        let record = f.service.upsert_local(Some(urn.clone()), tag("Sensitive")).await.unwrap();
        assert_eq!(record.sync_status, SyncStatus::Modified);

        let result = f.service.push(&urn, &mut f.router).await.unwrap();
        assert_eq!(result.proposals_generated, 1);
        assert_eq!(f.router.buffered_proposals()[0].aspect, serde_json::json!({ "name": "Sensitive" }));

        // a pending push is left for the next pull to resolve
        let record = f.service.upsert_local(Some(urn.clone()), tag("PII")).await.unwrap();
        assert_eq!(record.sync_status, SyncStatus::PendingPush);
    }

    #[tokio::test]
    async fn test_remote_deletion_then_recreate() {
        let mut f = fixture(true);
        let urn = Urn::from("urn:li:tag:pii");
        f.catalog.seed(urn.clone(), tag("PII")).await;
        f.service.upsert_local(Some(urn.clone()), tag("PII")).await.unwrap();
        f.service.pull(&[urn.clone()]).await.unwrap();

        assert!(f.catalog.remove(&urn).await);
        let report = f.service.pull(&[urn.clone()]).await.unwrap();
        assert_eq!(report.count(SyncStatus::RemoteDeleted), 1);

        let result = f.service.push(&urn, &mut f.router).await.unwrap();
        assert!(result.success);
        assert_eq!(result.operation, OperationKind::Create);
        assert_eq!(f.catalog.snapshot(&urn).await, Some(tag("PII")));
    }

    #[tokio::test]
    async fn test_unconfirmed_recreate_can_be_pushed_again() {
        let mut f = fixture(false);
        let urn = Urn::from("urn:li:tag:pii");
        f.catalog.seed(urn.clone(), tag("PII")).await;
        f.service.upsert_local(Some(urn.clone()), tag("PII")).await.unwrap();
        f.service.pull(&[urn.clone()]).await.unwrap();
        f.catalog.remove(&urn).await;
        f.service.pull(&[urn.clone()]).await.unwrap();

        let first = f.service.push(&urn, &mut f.router).await.unwrap();
        assert_eq!(first.operation, OperationKind::Create);
        assert_eq!(f.service.get(&urn).await.unwrap().unwrap().sync_status, SyncStatus::PendingPush);

        // proposals were buffered but never applied
        let report = f.service.pull(&[urn.clone()]).await.unwrap();
        assert_eq!(report.count(SyncStatus::LocalOnly), 1);
        assert!(f.service.get(&urn).await.unwrap().unwrap().remote.is_none());

        let second = f.service.push(&urn, &mut f.router).await.unwrap();
        assert!(second.success);
        assert_eq!(second.operation, OperationKind::Create);
        assert_eq!(f.router.buffered_proposals().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_push_keeps_status() {
        let mut f = fixture(true);
        let urn = Urn::from("urn:li:tag:pii");
        f.service.upsert_local(Some(urn.clone()), tag("PII")).await.unwrap();
        f.catalog.reject_mutation("createTag", "permission denied").await;

        let result = f.service.push(&urn, &mut f.router).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("permission denied"));
        assert_eq!(f.service.get(&urn).await.unwrap().unwrap().sync_status, SyncStatus::NotSynced);
    }

    #[tokio::test]
    async fn test_status_summary_counts_all_states() {
        let f = fixture(true);
        f.service.upsert_local(None, tag("A")).await.unwrap();
        f.service.upsert_local(None, tag("B")).await.unwrap();

        let summary = f.service.status_summary().await.unwrap();
        assert_eq!(summary.len(), 7);
        assert_eq!(summary[&SyncStatus::NotSynced], 2);
        assert_eq!(summary[&SyncStatus::Synced], 0);
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_kind_urn() {
        let f = fixture(true);
        let result = f.service.upsert_local(Some(Urn::from("urn:li:domain:x")), tag("PII")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
