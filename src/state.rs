//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::catalog::{ProposalSink, RemoteCatalog};
use crate::config::SyncConfig;
use crate::entity::EntityStore;
use crate::pipeline::{OperationRouter, RouterConfig};
use crate::proposal::OutputFormat;
use crate::sync::SyncService;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Application state shared across all handlers
pub struct AppState {
    pub store: Arc<dyn EntityStore>,

    /// Collaborator that applies buffered proposals on direct emission
    pub sink: Arc<dyn ProposalSink>,

    /// The router is single-caller; the mutex serializes requests
    pub router: Mutex<OperationRouter>,

    pub sync: SyncService,

    /// Default format for staged proposal files
    pub proposal_format: OutputFormat,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EntityStore>,
        catalog: Arc<dyn RemoteCatalog>,
        sink: Arc<dyn ProposalSink>,
        config: &SyncConfig,
    ) -> Self {
        let router = OperationRouter::new(
            RouterConfig {
                sync_mode: config.sync_mode,
                batch_mode: config.batch_mode,
                emit_to_file: config.emit_to_file,
                output_dir: config.output_dir.clone(),
            },
            catalog.clone(),
        );

        Self {
            sync: SyncService::new(store.clone(), catalog),
            store,
            sink,
            router: Mutex::new(router),
            proposal_format: config.format,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
