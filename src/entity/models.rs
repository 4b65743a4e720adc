//! Entity data models
//!
//! Defines the metadata entity kinds mirrored between the local store and
//! the remote catalog, their snapshots, and the stored entity record.

use crate::entity::Urn;
use crate::error::AppError;
use crate::sync::SyncStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Kinds of metadata entity handled by the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Tag,
    Domain,
    GlossaryNode,
    GlossaryTerm,
    DataProduct,
    DataContract,
    Assertion,
    Test,
    StructuredProperty,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Tag,
        EntityKind::Domain,
        EntityKind::GlossaryNode,
        EntityKind::GlossaryTerm,
        EntityKind::DataProduct,
        EntityKind::DataContract,
        EntityKind::Assertion,
        EntityKind::Test,
        EntityKind::StructuredProperty,
    ];

    /// Entity type segment used in URNs
    pub fn entity_type(&self) -> &'static str {
        match self {
            EntityKind::Tag => "tag",
            EntityKind::Domain => "domain",
            EntityKind::GlossaryNode => "glossaryNode",
            EntityKind::GlossaryTerm => "glossaryTerm",
            EntityKind::DataProduct => "dataProduct",
            EntityKind::DataContract => "dataContract",
            EntityKind::Assertion => "assertion",
            EntityKind::Test => "test",
            EntityKind::StructuredProperty => "structuredProperty",
        }
    }

    pub fn from_entity_type(entity_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.entity_type() == entity_type)
    }

    /// Aspect carrying name, description and kind-specific attributes
    pub fn properties_aspect(&self) -> &'static str {
        match self {
            EntityKind::Tag => "tagProperties",
            EntityKind::Domain => "domainProperties",
            EntityKind::GlossaryNode => "glossaryNodeInfo",
            EntityKind::GlossaryTerm => "glossaryTermInfo",
            EntityKind::DataProduct => "dataProductProperties",
            EntityKind::DataContract => "dataContractProperties",
            EntityKind::Assertion => "assertionInfo",
            EntityKind::Test => "testInfo",
            EntityKind::StructuredProperty => "propertyDefinition",
        }
    }

    /// Key aspect, targeted by DELETE proposals
    pub fn key_aspect(&self) -> String {
        format!("{}Key", self.entity_type())
    }

    pub fn create_mutation(&self) -> String {
        format!("create{}", self.pascal_name())
    }

    pub fn delete_mutation(&self) -> String {
        format!("delete{}", self.pascal_name())
    }

    fn pascal_name(&self) -> &'static str {
        match self {
            EntityKind::Tag => "Tag",
            EntityKind::Domain => "Domain",
            EntityKind::GlossaryNode => "GlossaryNode",
            EntityKind::GlossaryTerm => "GlossaryTerm",
            EntityKind::DataProduct => "DataProduct",
            EntityKind::DataContract => "DataContract",
            EntityKind::Assertion => "Assertion",
            EntityKind::Test => "Test",
            EntityKind::StructuredProperty => "StructuredProperty",
        }
    }

    /// Look up the kind a create/delete mutation name refers to
    pub fn from_mutation(name: &str) -> Option<(MutationVerb, Self)> {
        let (verb, rest) = if let Some(rest) = name.strip_prefix("create") {
            (MutationVerb::Create, rest)
        } else if let Some(rest) = name.strip_prefix("delete") {
            (MutationVerb::Delete, rest)
        } else {
            return None;
        };
        Self::ALL
            .into_iter()
            .find(|k| k.pascal_name() == rest)
            .map(|k| (verb, k))
    }
}

/// Verb half of a per-kind mutation name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationVerb {
    Create,
    Delete,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entity_type())
    }
}

impl FromStr for EntityKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_entity_type(s)
            .ok_or_else(|| AppError::Validation(format!("Unknown entity kind '{}'", s)))
    }
}

/// Kind-specific attributes, one variant per entity kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EntityAttributes {
    Tag {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color_hex: Option<String>,
    },
    Domain {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_domain: Option<Urn>,
    },
    GlossaryNode {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_node: Option<Urn>,
    },
    GlossaryTerm {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_node: Option<Urn>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        term_source: Option<String>,
    },
    DataProduct {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        domain: Option<Urn>,
        #[serde(default)]
        assets: Vec<Urn>,
    },
    DataContract {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity: Option<Urn>,
        #[serde(default)]
        assertions: Vec<Urn>,
    },
    Assertion {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity: Option<Urn>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assertion_type: Option<String>,
    },
    Test {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        definition: Option<String>,
    },
    StructuredProperty {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qualified_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cardinality: Option<String>,
        #[serde(default)]
        entity_types: Vec<String>,
        #[serde(default)]
        allowed_values: Vec<String>,
    },
}

impl EntityAttributes {
    /// Attributes with every field unset
    pub fn empty(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Tag => EntityAttributes::Tag { color_hex: None },
            EntityKind::Domain => EntityAttributes::Domain { parent_domain: None },
            EntityKind::GlossaryNode => EntityAttributes::GlossaryNode { parent_node: None },
            EntityKind::GlossaryTerm => EntityAttributes::GlossaryTerm {
                parent_node: None,
                term_source: None,
            },
            EntityKind::DataProduct => EntityAttributes::DataProduct {
                domain: None,
                assets: Vec::new(),
            },
            EntityKind::DataContract => EntityAttributes::DataContract {
                entity: None,
                assertions: Vec::new(),
            },
            EntityKind::Assertion => EntityAttributes::Assertion {
                entity: None,
                assertion_type: None,
            },
            EntityKind::Test => EntityAttributes::Test {
                category: None,
                definition: None,
            },
            EntityKind::StructuredProperty => EntityAttributes::StructuredProperty {
                qualified_name: None,
                value_type: None,
                cardinality: None,
                entity_types: Vec::new(),
                allowed_values: Vec::new(),
            },
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityAttributes::Tag { .. } => EntityKind::Tag,
            EntityAttributes::Domain { .. } => EntityKind::Domain,
            EntityAttributes::GlossaryNode { .. } => EntityKind::GlossaryNode,
            EntityAttributes::GlossaryTerm { .. } => EntityKind::GlossaryTerm,
            EntityAttributes::DataProduct { .. } => EntityKind::DataProduct,
            EntityAttributes::DataContract { .. } => EntityKind::DataContract,
            EntityAttributes::Assertion { .. } => EntityKind::Assertion,
            EntityAttributes::Test { .. } => EntityKind::Test,
            EntityAttributes::StructuredProperty { .. } => EntityKind::StructuredProperty,
        }
    }

    /// Attribute key holding the hierarchical parent, for kinds that have one
    pub fn parent_field(kind: EntityKind) -> Option<&'static str> {
        match kind {
            EntityKind::Domain => Some("parentDomain"),
            EntityKind::GlossaryNode | EntityKind::GlossaryTerm => Some("parentNode"),
            _ => None,
        }
    }

    pub fn parent(&self) -> Option<&Urn> {
        match self {
            EntityAttributes::Domain { parent_domain } => parent_domain.as_ref(),
            EntityAttributes::GlossaryNode { parent_node }
            | EntityAttributes::GlossaryTerm { parent_node, .. } => parent_node.as_ref(),
            _ => None,
        }
    }

    pub fn set_parent(&mut self, parent: Option<Urn>) -> Result<(), AppError> {
        match self {
            EntityAttributes::Domain { parent_domain } => *parent_domain = parent,
            EntityAttributes::GlossaryNode { parent_node }
            | EntityAttributes::GlossaryTerm { parent_node, .. } => *parent_node = parent,
            other => {
                return Err(AppError::Validation(format!(
                    "A {} has no parent",
                    other.kind()
                )))
            }
        }
        Ok(())
    }

    /// Copy with blank strings dropped and list fields sorted, for comparison
    fn normalized(&self) -> Self {
        fn text(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }
        fn sorted<T: Ord + Clone>(values: &[T]) -> Vec<T> {
            let mut values = values.to_vec();
            values.sort();
            values.dedup();
            values
        }

        match self {
            EntityAttributes::Tag { color_hex } => EntityAttributes::Tag {
                color_hex: text(color_hex).map(|c| c.to_ascii_lowercase()),
            },
            EntityAttributes::Domain { parent_domain } => EntityAttributes::Domain {
                parent_domain: parent_domain.clone(),
            },
            EntityAttributes::GlossaryNode { parent_node } => EntityAttributes::GlossaryNode {
                parent_node: parent_node.clone(),
            },
            EntityAttributes::GlossaryTerm { parent_node, term_source } => {
                EntityAttributes::GlossaryTerm {
                    parent_node: parent_node.clone(),
                    term_source: text(term_source),
                }
            }
            EntityAttributes::DataProduct { domain, assets } => EntityAttributes::DataProduct {
                domain: domain.clone(),
                assets: sorted(assets),
            },
            EntityAttributes::DataContract { entity, assertions } => {
                EntityAttributes::DataContract {
                    entity: entity.clone(),
                    assertions: sorted(assertions),
                }
            }
            EntityAttributes::Assertion { entity, assertion_type } => EntityAttributes::Assertion {
                entity: entity.clone(),
                assertion_type: text(assertion_type),
            },
            EntityAttributes::Test { category, definition } => EntityAttributes::Test {
                category: text(category),
                definition: text(definition),
            },
            EntityAttributes::StructuredProperty {
                qualified_name,
                value_type,
                cardinality,
                entity_types,
                allowed_values,
            } => EntityAttributes::StructuredProperty {
                qualified_name: text(qualified_name),
                value_type: text(value_type),
                cardinality: text(cardinality),
                entity_types: sorted(entity_types),
                allowed_values: sorted(allowed_values),
            },
        }
    }

    /// Attribute fields as a flat JSON object (no `kind` tag)
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => {
                map.remove("kind");
                map
            }
            _ => Map::new(),
        }
    }

    /// Rebuild attributes of `kind` from a flat JSON object
    pub fn from_fields(kind: EntityKind, fields: &Map<String, Value>) -> Result<Self, AppError> {
        let mut map = fields.clone();
        map.insert("kind".to_string(), Value::String(kind.entity_type().to_string()));
        serde_json::from_value(Value::Object(map))
            .map_err(|e| AppError::Validation(format!("Invalid {} attributes: {}", kind, e)))
    }
}

/// Ownership entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub owner: Urn,
    #[serde(rename = "type", default = "default_ownership_type")]
    pub ownership_type: String,
}

fn default_ownership_type() -> String {
    "TECHNICAL_OWNER".to_string()
}

/// Content of one copy (local or remote) of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub attributes: EntityAttributes,
}

/// Shape accepted for snapshots arriving from the remote catalog
#[derive(Deserialize)]
struct RemoteSnapshotWire {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    attributes: Option<EntityAttributes>,
}

impl EntitySnapshot {
    pub fn new(name: impl Into<String>, description: Option<String>, attributes: EntityAttributes) -> Self {
        Self {
            name: name.into(),
            description,
            attributes,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.attributes.kind()
    }

    /// Field-level comparison of name, description and attributes
    pub fn content_eq(&self, other: &EntitySnapshot) -> bool {
        fn description(value: &Option<String>) -> &str {
            value.as_deref().map(str::trim).unwrap_or("")
        }

        self.name.trim() == other.name.trim()
            && description(&self.description) == description(&other.description)
            && self.attributes.normalized() == other.attributes.normalized()
    }

    /// SHA-256 over the normalized content
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.trim().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.description.as_deref().map(str::trim).unwrap_or("").as_bytes());
        hasher.update([0u8]);
        let attributes = serde_json::to_string(&self.attributes.normalized()).unwrap_or_default();
        hasher.update(attributes.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Parse a snapshot reported by the remote catalog.
    ///
    /// `name` is required; missing attributes default to empty ones of
    /// `kind`, and attributes of another kind are rejected.
    pub fn from_remote(kind: EntityKind, value: &Value) -> Result<Self, AppError> {
        let wire: RemoteSnapshotWire = serde_json::from_value(value.clone())
            .map_err(|e| AppError::Validation(format!("Malformed remote snapshot: {}", e)))?;

        if wire.name.trim().is_empty() {
            return Err(AppError::Validation("Remote snapshot has an empty name".to_string()));
        }

        let attributes = wire.attributes.unwrap_or_else(|| EntityAttributes::empty(kind));
        if attributes.kind() != kind {
            return Err(AppError::Validation(format!(
                "Remote snapshot carries {} attributes, expected {}",
                attributes.kind(),
                kind
            )));
        }

        Ok(Self {
            name: wire.name,
            description: wire.description,
            attributes,
        })
    }

    /// Flat properties-aspect payload: name, description and attribute fields
    pub fn to_aspect(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("name".to_string(), Value::String(self.name.clone()));
        if let Some(description) = &self.description {
            map.insert("description".to_string(), Value::String(description.clone()));
        }
        map.extend(self.attributes.to_fields());
        map
    }

    /// Overlay a (possibly partial) properties-aspect payload onto this snapshot
    pub fn apply_aspect(&mut self, payload: &Map<String, Value>) -> Result<(), AppError> {
        let mut fields = self.attributes.to_fields();
        for (key, value) in payload {
            match key.as_str() {
                "name" => {
                    self.name = value
                        .as_str()
                        .ok_or_else(|| AppError::Validation("name must be a string".to_string()))?
                        .to_string();
                }
                "description" => {
                    self.description = value.as_str().map(str::to_string);
                }
                _ => {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }
        self.attributes = EntityAttributes::from_fields(self.kind(), &fields)?;
        Ok(())
    }
}

/// A stored entity: local copy, last-known remote copy and sync status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub urn: Urn,
    pub kind: EntityKind,
    /// Absent for remote-only records awaiting import
    pub local: Option<EntitySnapshot>,
    /// Last snapshot seen from the remote catalog
    pub remote: Option<EntitySnapshot>,
    pub sync_status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRecord {
    /// A freshly created local entity, never compared against remote
    pub fn new_local(urn: Urn, snapshot: EntitySnapshot) -> Self {
        Self {
            kind: snapshot.kind(),
            urn,
            local: Some(snapshot),
            remote: None,
            sync_status: SyncStatus::NotSynced,
            last_synced_at: None,
            updated_at: Utc::now(),
        }
    }

    /// A record known only from the remote catalog
    pub fn new_remote(urn: Urn, snapshot: EntitySnapshot) -> Self {
        Self {
            kind: snapshot.kind(),
            urn,
            local: None,
            remote: Some(snapshot),
            sync_status: SyncStatus::RemoteOnly,
            last_synced_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Display name, preferring the local copy
    pub fn name(&self) -> Option<&str> {
        self.local
            .as_ref()
            .or(self.remote.as_ref())
            .map(|s| s.name.as_str())
    }
}
