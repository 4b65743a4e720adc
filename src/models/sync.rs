//! Pull / import / push models

use crate::entity::{EntityKind, Urn};
use crate::sync::SyncStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pull specific URNs, or everything (optionally of one kind) when none are given
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    #[serde(default)]
    pub urns: Vec<Urn>,
    pub kind: Option<EntityKind>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrnRequest {
    pub urn: Urn,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummaryResponse {
    pub total: usize,
    pub statuses: BTreeMap<SyncStatus, usize>,
}
