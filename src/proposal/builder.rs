//! Change-proposal construction
//!
//! A change proposal is one intended mutation of one aspect of one entity.
//! Records are durable on their own: each carries its own system metadata.

use crate::entity::Urn;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Entity type recorded when a URN has too few segments to derive one
pub const UNKNOWN_ENTITY_TYPE: &str = "unknown";

/// Prefix of fabricated run identifiers
const RUN_ID_PREFIX: &str = "metasync";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Upsert,
    Delete,
}

impl Default for ChangeType {
    fn default() -> Self {
        ChangeType::Upsert
    }
}

/// Provenance attached to every proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetadata {
    /// Milliseconds since the Unix epoch
    pub last_observed: i64,
    pub run_id: String,
}

impl SystemMetadata {
    /// Current time and a fresh random run id
    pub fn fresh() -> Self {
        Self {
            last_observed: Utc::now().timestamp_millis(),
            run_id: format!("{}-{}", RUN_ID_PREFIX, Uuid::new_v4()),
        }
    }
}

/// A single aspect mutation, ready to be staged or emitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeProposalRecord {
    pub entity_type: String,
    pub entity_urn: Urn,
    pub change_type: ChangeType,
    pub aspect_name: String,
    pub aspect: Value,
    pub system_metadata: SystemMetadata,
}

impl ChangeProposalRecord {
    pub fn is_unknown_type(&self) -> bool {
        self.entity_type == UNKNOWN_ENTITY_TYPE
    }
}

pub struct ProposalBuilder;

impl ProposalBuilder {
    /// UPSERT proposal with fabricated system metadata
    pub fn build(entity_urn: &Urn, aspect_name: &str, aspect: Value) -> ChangeProposalRecord {
        Self::build_with(entity_urn, aspect_name, aspect, ChangeType::Upsert, None)
    }

    /// Proposal with an explicit change type and optional system metadata.
    ///
    /// Never fails: a URN without an entity type segment yields
    /// [`UNKNOWN_ENTITY_TYPE`] and the caller decides whether that is acceptable.
    pub fn build_with(
        entity_urn: &Urn,
        aspect_name: &str,
        aspect: Value,
        change_type: ChangeType,
        system_metadata: Option<SystemMetadata>,
    ) -> ChangeProposalRecord {
        ChangeProposalRecord {
            entity_type: entity_urn
                .entity_type()
                .unwrap_or(UNKNOWN_ENTITY_TYPE)
                .to_string(),
            entity_urn: entity_urn.clone(),
            change_type,
            aspect_name: aspect_name.to_string(),
            aspect,
            system_metadata: system_metadata.unwrap_or_else(SystemMetadata::fresh),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_type_from_urn() {
        let record = ProposalBuilder::build(&Urn::from("scheme:kind:tag:pii"), "tagProperties", json!({}));
        assert_eq!(record.entity_type, "tag");
        assert_eq!(record.change_type, ChangeType::Upsert);
        assert!(!record.is_unknown_type());
    }

    #[test]
    fn test_unknown_entity_type() {
        let record = ProposalBuilder::build(&Urn::from("justastring"), "status", json!({ "removed": true }));
        assert_eq!(record.entity_type, UNKNOWN_ENTITY_TYPE);
        assert!(record.is_unknown_type());
    }

    #[test]
    fn test_fresh_run_ids_differ() {
        let urn = Urn::from("urn:li:tag:pii");
        let a = ProposalBuilder::build(&urn, "tagProperties", json!({}));
        let b = ProposalBuilder::build(&urn, "ownership", json!({}));
        assert_ne!(a.system_metadata.run_id, b.system_metadata.run_id);
        assert!(a.system_metadata.run_id.starts_with("metasync-"));
        assert!(a.system_metadata.last_observed > 0);
    }

    #[test]
    fn test_explicit_metadata_is_kept() {
        let metadata = SystemMetadata {
            last_observed: 42,
            run_id: "fixed".to_string(),
        };
        let record = ProposalBuilder::build_with(
            &Urn::from("urn:li:domain:finance"),
            "domainKey",
            Value::Null,
            ChangeType::Delete,
            Some(metadata.clone()),
        );
        assert_eq!(record.system_metadata, metadata);
        assert_eq!(record.change_type, ChangeType::Delete);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["changeType"], "DELETE");
        assert_eq!(json["entityUrn"], "urn:li:domain:finance");
        assert_eq!(json["systemMetadata"]["runId"], "fixed");
    }
}
