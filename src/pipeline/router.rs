//! Dual-mode operation router
//!
//! Decides, per operation, whether it runs now or waits in the batch queue,
//! and whether it becomes direct mutations or buffered change proposals.

use crate::catalog::RemoteCatalog;
use crate::error::AppError;
use crate::pipeline::deferred;
use crate::pipeline::direct::DirectExecutor;
use crate::pipeline::{BatchOperationResult, Operation, OperationDescriptor, OperationResult};
use crate::proposal::{ChangeProposalRecord, OutputFormat, ProposalEmitter};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Mode flags; changed only through the router's setters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// Direct mutations when true, change proposals when false
    pub sync_mode: bool,
    pub batch_mode: bool,
    /// Also stage each operation's proposals to a file (async mode)
    pub emit_to_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

pub struct OperationRouter {
    config: RouterConfig,
    queue: Vec<OperationDescriptor>,
    emitter: ProposalEmitter,
    catalog: Arc<dyn RemoteCatalog>,
}

impl OperationRouter {
    pub fn new(config: RouterConfig, catalog: Arc<dyn RemoteCatalog>) -> Self {
        Self {
            emitter: ProposalEmitter::new(config.output_dir.clone()),
            config,
            queue: Vec::new(),
            catalog,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn set_sync_mode(&mut self, sync_mode: bool) {
        debug!("Sync mode set to {}", sync_mode);
        self.config.sync_mode = sync_mode;
    }

    pub fn set_output_mode(&mut self, emit_to_file: bool, output_dir: Option<PathBuf>) {
        debug!("Emit to file set to {} ({:?})", emit_to_file, output_dir);
        self.config.emit_to_file = emit_to_file;
        self.emitter.set_output_dir(output_dir.clone());
        self.config.output_dir = output_dir;
    }

    /// Turning batch mode off flushes whatever is queued and returns the result
    pub async fn set_batch_mode(&mut self, batch_mode: bool) -> Option<BatchOperationResult> {
        debug!("Batch mode set to {}", batch_mode);
        self.config.batch_mode = batch_mode;

        if !batch_mode && !self.queue.is_empty() {
            return Some(self.flush_batch().await);
        }
        None
    }

    /// Queue or dispatch one operation
    pub async fn submit(&mut self, descriptor: OperationDescriptor) -> OperationResult {
        let batching = descriptor.batch.unwrap_or(self.config.batch_mode);
        if batching {
            let operation = &descriptor.operation;
            let result = OperationResult::queued(operation.kind(), operation.target_urn().cloned());
            debug!("Queued {} operation ({} pending)", operation.kind(), self.queue.len() + 1);
            self.queue.push(descriptor);
            return result;
        }

        self.dispatch(&descriptor.operation).await
    }

    /// Execute every queued operation in submission order with the current mode
    pub async fn flush_batch(&mut self) -> BatchOperationResult {
        let queued = std::mem::take(&mut self.queue);
        info!(
            "Flushing {} queued operations ({} mode)",
            queued.len(),
            if self.config.sync_mode { "sync" } else { "async" }
        );

        let mut batch = BatchOperationResult::default();
        for descriptor in &queued {
            let result = self.dispatch(&descriptor.operation).await;
            batch.push(result);
        }

        let summary = batch.summary();
        info!(
            "Batch complete: {}/{} succeeded, {} proposals generated",
            summary.success_count, summary.total_operations, summary.total_proposals
        );
        batch
    }

    pub fn pending_operations(&self) -> &[OperationDescriptor] {
        &self.queue
    }

    pub fn buffered_proposals(&self) -> &[ChangeProposalRecord] {
        self.emitter.records()
    }

    pub fn emitter(&self) -> &ProposalEmitter {
        &self.emitter
    }

    pub fn emitter_mut(&mut self) -> &mut ProposalEmitter {
        &mut self.emitter
    }

    async fn dispatch(&mut self, operation: &Operation) -> OperationResult {
        let kind = operation.kind();

        if let Err(e) = operation.validate() {
            warn!("Rejected {} operation: {}", kind, e);
            return OperationResult::failed(kind, operation.target_urn().cloned(), e.to_string());
        }

        let mut operation = operation.clone();
        operation.resolve_urn();
        let target = operation.target_urn().cloned();

        let result = if self.config.sync_mode {
            DirectExecutor::new(self.catalog.as_ref()).execute(&operation).await
        } else {
            self.stage(&operation).await
        };

        match result {
            Ok(result) if result.success => {
                debug!("{} operation on {:?} succeeded", kind, result.target_urn);
                result
            }
            Ok(result) => {
                warn!(
                    "{} operation on {:?} partially applied: {}",
                    kind,
                    result.target_urn,
                    result.error.as_deref().unwrap_or_default()
                );
                result
            }
            Err(e) => {
                warn!("{} operation on {:?} failed: {}", kind, target, e);
                OperationResult::failed(kind, target, e.to_string())
            }
        }
    }

    /// Async path: build proposals, optionally stage them, then buffer them
    async fn stage(&mut self, operation: &Operation) -> Result<OperationResult, AppError> {
        let (urn, records) = deferred::plan(operation)?;

        let output_path = if self.config.emit_to_file {
            let filename = format!(
                "{}-{}-{}.json",
                urn.slug(),
                Utc::now().format("%Y%m%dT%H%M%S%3f"),
                &Uuid::new_v4().simple().to_string()[..8]
            );
            Some(self.emitter.write_records(&filename, OutputFormat::Json, &records).await?)
        } else {
            None
        };

        let mut result = OperationResult::succeeded(operation.kind(), Some(urn));
        result.proposals_generated = records.len();
        result.output_path = output_path;

        self.emitter.extend(records);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::entity::{EntityKind, Owner, Urn};
    use crate::pipeline::{EntityChanges, EntityInput, OperationKind};
    use pretty_assertions::assert_eq;

    fn create(kind: EntityKind, id: &str, name: &str) -> OperationDescriptor {
        let mut input = EntityInput::named(name);
        input.id = Some(id.to_string());
        OperationDescriptor::new(Operation::Create { kind, urn: None, input })
    }

    fn rename(urn: &str, name: &str) -> OperationDescriptor {
        OperationDescriptor::new(Operation::Update {
            urn: Urn::from(urn),
            changes: EntityChanges {
                name: Some(name.to_string()),
                ..Default::default()
            },
        })
    }

    fn router(sync_mode: bool) -> (OperationRouter, Arc<InMemoryCatalog>) {
        let catalog = Arc::new(InMemoryCatalog::new());
        let config = RouterConfig {
            sync_mode,
            ..Default::default()
        };
        (OperationRouter::new(config, catalog.clone()), catalog)
    }

    #[tokio::test]
    async fn test_async_create_buffers_one_proposal() {
        let (mut router, catalog) = router(false);
        // async mode never talks to the catalog
        catalog.set_unreachable(true);

        let result = router.submit(create(EntityKind::Tag, "pii", "PII")).await;

        assert!(result.success);
        assert!(!result.queued);
        assert_eq!(result.proposals_generated, 1);
        assert_eq!(router.buffered_proposals().len(), 1);
        assert_eq!(router.buffered_proposals()[0].entity_urn.as_str(), "urn:li:tag:pii");
    }

    #[tokio::test]
    async fn test_sync_create_hits_catalog() {
        let (mut router, catalog) = router(true);
        let result = router.submit(create(EntityKind::Domain, "finance", "Finance")).await;

        assert!(result.success);
        assert_eq!(result.target_urn, Some(Urn::from("urn:li:domain:finance")));
        assert!(router.buffered_proposals().is_empty());
        assert_eq!(
            catalog.snapshot(&Urn::from("urn:li:domain:finance")).await.unwrap().name,
            "Finance"
        );
    }

    #[tokio::test]
    async fn test_sync_create_reports_urn_when_owners_fail() {
        let (mut router, catalog) = router(true);
        catalog.reject_mutation("updateOwners", "no such owner").await;

        let mut input = EntityInput::named("PII");
        input.owners = vec![Owner {
            owner: Urn::from("urn:li:corpuser:ghost"),
            ownership_type: "TECHNICAL_OWNER".into(),
        }];
        let result = router
            .submit(OperationDescriptor::new(Operation::Create {
                kind: EntityKind::Tag,
                urn: None,
                input,
            }))
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("no such owner"));
        let urn = result.target_urn.unwrap();
        assert!(catalog.snapshot(&urn).await.is_some());
        assert_eq!(catalog.executed_mutations().await, vec!["createTag", "updateOwners"]);
    }

    #[tokio::test]
    async fn test_async_create_without_id_reports_proposal_urn() {
        let (mut router, _catalog) = router(false);
        let result = router
            .submit(OperationDescriptor::new(Operation::Create {
                kind: EntityKind::Tag,
                urn: None,
                input: EntityInput::named("PII"),
            }))
            .await;

        assert_eq!(result.target_urn.as_ref(), Some(&router.buffered_proposals()[0].entity_urn));
    }

    #[tokio::test]
    async fn test_batch_queue_and_flush() {
        let (mut router, _catalog) = router(false);
        assert_eq!(router.set_batch_mode(true).await, None);

        for id in ["a", "b", "c"] {
            let result = router.submit(create(EntityKind::Tag, id, id)).await;
            assert!(result.success);
            assert!(result.queued);
        }
        assert_eq!(router.pending_operations().len(), 3);
        assert!(router.buffered_proposals().is_empty());

        let batch = router.flush_batch().await;
        assert_eq!(batch.total_operations(), 3);
        assert_eq!(batch.total_proposals(), 3);
        assert!(router.pending_operations().is_empty());
    }

    #[tokio::test]
    async fn test_flush_keeps_order_when_middle_fails() {
        let (mut router, _catalog) = router(true);
        router.set_batch_mode(true).await;

        router.submit(create(EntityKind::Tag, "a", "A")).await;
        router.submit(rename("urn:li:tag:missing", "B")).await;
        router.submit(create(EntityKind::Tag, "c", "C")).await;

        let batch = router.flush_batch().await;
        let urns: Vec<_> = batch
            .results
            .iter()
            .map(|r| r.target_urn.as_ref().map(|u| u.to_string()).unwrap_or_default())
            .collect();
        assert_eq!(urns, vec!["urn:li:tag:a", "urn:li:tag:missing", "urn:li:tag:c"]);

        let successes: Vec<_> = batch.results.iter().map(|r| r.success).collect();
        assert_eq!(successes, vec![true, false, true]);
        assert_eq!(
            batch.get_failed_operations()[0].error.as_deref(),
            Some("Entity urn:li:tag:missing not found")
        );
    }

    #[tokio::test]
    async fn test_flush_uses_mode_at_flush_time() {
        let (mut router, catalog) = router(true);
        router.set_batch_mode(true).await;
        router.submit(create(EntityKind::Tag, "pii", "PII")).await;

        router.set_sync_mode(false);
        let batch = router.flush_batch().await;

        assert_eq!(batch.total_proposals(), 1);
        assert!(catalog.executed_mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_turning_batch_off_flushes() {
        let (mut router, _catalog) = router(false);
        router.set_batch_mode(true).await;
        router.submit(create(EntityKind::Tag, "a", "A")).await;
        router.submit(create(EntityKind::Tag, "b", "B")).await;

        let batch = router.set_batch_mode(false).await.unwrap();
        assert_eq!(batch.success_count(), 2);
        assert!(router.pending_operations().is_empty());
        assert_eq!(router.buffered_proposals().len(), 2);
    }

    #[tokio::test]
    async fn test_descriptor_overrides_batch_mode() {
        let (mut router, _catalog) = router(false);
        router.set_batch_mode(true).await;

        let mut immediate = create(EntityKind::Tag, "now", "Now");
        immediate.batch = Some(false);
        let result = router.submit(immediate).await;
        assert!(!result.queued);
        assert_eq!(router.buffered_proposals().len(), 1);

        router.set_batch_mode(false).await;
        let mut later = create(EntityKind::Tag, "later", "Later");
        later.batch = Some(true);
        assert!(router.submit(later).await.queued);
        assert_eq!(router.pending_operations().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_operation_has_no_side_effect() {
        let (mut router, catalog) = router(true);
        let result = router.submit(create(EntityKind::Tag, "blank", "  ")).await;

        assert!(!result.success);
        assert_eq!(result.operation, OperationKind::Create);
        assert!(catalog.executed_mutations().await.is_empty());

        router.set_sync_mode(false);
        let result = router.submit(create(EntityKind::Tag, "blank", "")).await;
        assert!(!result.success);
        assert!(router.buffered_proposals().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_catalog_becomes_failure() {
        let (mut router, catalog) = router(true);
        catalog.set_unreachable(true);
        let result = router.submit(create(EntityKind::Tag, "pii", "PII")).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_emit_to_file_writes_operation_proposals() {
        let dir = tempfile::tempdir().unwrap();
        let (mut router, _catalog) = router(false);
        router.set_output_mode(true, Some(dir.path().to_path_buf()));

        router.submit(create(EntityKind::Tag, "a", "A")).await;
        let result = router.submit(create(EntityKind::Tag, "b", "B")).await;

        let path = result.output_path.expect("staged file");
        let staged = ProposalEmitter::read_file(&path).await.unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].entity_urn.as_str(), "urn:li:tag:b");
        assert_eq!(router.buffered_proposals().len(), 2);
    }

    #[tokio::test]
    async fn test_emit_to_file_without_dir_fails_cleanly() {
        let (mut router, _catalog) = router(false);
        router.set_output_mode(true, None);

        let result = router.submit(create(EntityKind::Tag, "a", "A")).await;
        assert!(!result.success);
        assert!(router.buffered_proposals().is_empty());
    }
}
