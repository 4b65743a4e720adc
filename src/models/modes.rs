//! Mode-switching models

use crate::pipeline::{BatchOperationResult, BatchSummary, RouterConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Change one or more routing modes; absent fields keep their value
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateModesRequest {
    pub sync_mode: Option<bool>,
    pub batch_mode: Option<bool>,
    pub emit_to_file: Option<bool>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModesResponse {
    pub modes: RouterConfig,
    /// Present when turning batch mode off flushed the queue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flushed: Option<BatchResponse>,
}

/// Batch results with their derived counters
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub summary: BatchSummary,
    #[serde(flatten)]
    pub batch: BatchOperationResult,
}

impl From<BatchOperationResult> for BatchResponse {
    fn from(batch: BatchOperationResult) -> Self {
        Self {
            summary: batch.summary(),
            batch,
        }
    }
}
