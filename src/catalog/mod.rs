//! Remote Catalog Module
//!
//! Interfaces to the remote metadata catalog that holds the authoritative
//! copy of every entity. Calls are awaited one at a time by the engine;
//! timeouts are the connection's responsibility.

mod memory;

use crate::entity::{EntityKind, Urn};
use crate::error::AppError;
use crate::proposal::ChangeProposalRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use memory::InMemoryCatalog;

/// Mutation names understood by catalog connections, besides the
/// per-kind `create<Kind>` / `delete<Kind>` mutations.
pub mod mutations {
    pub const UPDATE_NAME: &str = "updateName";
    pub const UPDATE_DESCRIPTION: &str = "updateDescription";
    pub const UPDATE_PROPERTIES: &str = "updateProperties";
    pub const UPDATE_OWNERS: &str = "updateOwners";
    pub const SET_DOMAIN: &str = "setDomain";
    pub const SET_PARENT: &str = "setParent";
    pub const BATCH_SET_DATA_PRODUCT: &str = "batchSetDataProduct";
    pub const ADD_TAG: &str = "addTag";
    pub const ADD_TERM: &str = "addTerm";
}

/// Aspect names used by change proposals, besides each kind's
/// properties and key aspects.
pub mod aspects {
    pub const OWNERSHIP: &str = "ownership";
    pub const DOMAINS: &str = "domains";
    pub const GLOBAL_TAGS: &str = "globalTags";
    pub const GLOSSARY_TERMS: &str = "glossaryTerms";
    pub const DATA_PRODUCT_ASSETS: &str = "dataProductAssets";
}

/// Outcome of a single remote mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MutationResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Connection to the remote catalog.
///
/// A rejected mutation is an `Ok` response with `success == false`; `Err`
/// is reserved for the catalog being unreachable or answering garbage.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    async fn execute_mutation(&self, name: &str, input: Value) -> Result<MutationResponse, AppError>;

    /// Current remote snapshot of an entity, or `None` if it doesn't exist
    async fn fetch_entity(&self, urn: &Urn) -> Result<Option<Value>, AppError>;

    async fn list_entities(&self, kind: EntityKind) -> Result<Vec<Urn>, AppError>;
}

/// Collaborator that applies buffered change proposals directly
#[async_trait]
pub trait ProposalSink: Send + Sync {
    /// Returns whether the whole batch was accepted
    async fn emit_proposals(&self, records: &[ChangeProposalRecord]) -> Result<bool, AppError>;
}
