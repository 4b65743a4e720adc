//! Operation results and batch aggregation

use crate::entity::Urn;
use crate::pipeline::OperationKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Outcome of routing one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    pub operation: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_urn: Option<Urn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Proposals appended to the buffer (async mode only)
    #[serde(default)]
    pub proposals_generated: usize,
    /// Staged file written for this operation, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Accepted into the batch queue; not executed yet
    #[serde(default)]
    pub queued: bool,
}

impl OperationResult {
    pub fn succeeded(operation: OperationKind, target_urn: Option<Urn>) -> Self {
        Self {
            success: true,
            operation,
            target_urn,
            data: None,
            error: None,
            proposals_generated: 0,
            output_path: None,
            queued: false,
        }
    }

    pub fn failed(operation: OperationKind, target_urn: Option<Urn>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::succeeded(operation, target_urn)
        }
    }

    pub fn queued(operation: OperationKind, target_urn: Option<Urn>) -> Self {
        Self {
            queued: true,
            ..Self::succeeded(operation, target_urn)
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Aggregate of the results of one batch, in submission order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOperationResult {
    pub results: Vec<OperationResult>,
}

/// Derived counters of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_operations: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub success_rate: f64,
    pub total_proposals: usize,
    pub operation_kinds: BTreeSet<OperationKind>,
}

impl BatchOperationResult {
    pub fn new(results: Vec<OperationResult>) -> Self {
        Self { results }
    }

    pub fn push(&mut self, result: OperationResult) {
        self.results.push(result);
    }

    pub fn total_operations(&self) -> usize {
        self.results.len()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.total_operations() - self.success_count()
    }

    /// Successes over total; 0 for an empty batch
    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.success_count() as f64 / self.total_operations() as f64
    }

    pub fn total_proposals(&self) -> usize {
        self.results.iter().map(|r| r.proposals_generated).sum()
    }

    pub fn operation_kinds(&self) -> BTreeSet<OperationKind> {
        self.results.iter().map(|r| r.operation).collect()
    }

    pub fn get_failed_operations(&self) -> Vec<&OperationResult> {
        self.results.iter().filter(|r| !r.success).collect()
    }

    pub fn group_by_kind(&self) -> BTreeMap<OperationKind, Vec<&OperationResult>> {
        let mut groups: BTreeMap<OperationKind, Vec<&OperationResult>> = BTreeMap::new();
        for result in &self.results {
            groups.entry(result.operation).or_default().push(result);
        }
        groups
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            total_operations: self.total_operations(),
            success_count: self.success_count(),
            failure_count: self.failure_count(),
            success_rate: self.success_rate(),
            total_proposals: self.total_proposals(),
            operation_kinds: self.operation_kinds(),
        }
    }
}

impl FromIterator<OperationResult> for BatchOperationResult {
    fn from_iter<I: IntoIterator<Item = OperationResult>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
