//! Local entity models

use crate::entity::{EntityAttributes, EntityKind, EntityRecord, EntitySnapshot, Urn};
use crate::sync::SyncStatus;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to create or edit the local copy of an entity
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertEntityRequest {
    /// Generated from the kind when absent
    pub urn: Option<Urn>,
    #[validate(length(min = 1, max = 256, message = "Entity name is required"))]
    pub name: String,
    pub description: Option<String>,
    /// Carries the entity kind
    pub attributes: EntityAttributes,
}

impl UpsertEntityRequest {
    pub fn into_parts(self) -> (Option<Urn>, EntitySnapshot) {
        (
            self.urn,
            EntitySnapshot::new(self.name, self.description, self.attributes),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityListQuery {
    pub kind: Option<EntityKind>,
    pub status: Option<SyncStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityListResponse {
    pub count: usize,
    pub entities: Vec<EntityRecord>,
}
