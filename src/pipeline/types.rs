//! Operation types for the routing pipeline

use crate::entity::{EntityAttributes, EntityKind, Owner, Urn};
use crate::error::{validation_error, AppError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

static COLOR_HEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("color pattern is valid")
});

/// Kind of logical operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Relate,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Relate => "relate",
        };
        f.write_str(name)
    }
}

/// Payload of a create operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EntityInput {
    /// Id segment for the new URN; a UUID is generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200, message = "Entity id must be between 1 and 200 characters"))]
    pub id: Option<String>,
    #[validate(
        length(min = 1, max = 256, message = "Entity name is required"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<EntityAttributes>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<Owner>,
}

impl EntityInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            attributes: None,
            owners: Vec::new(),
        }
    }
}

/// Payload of an update operation; only the fields present are changed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EntityChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(min = 1, max = 256, message = "Entity name cannot be empty"),
        custom(function = "validate_not_blank")
    )]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<EntityAttributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owners: Option<Vec<Owner>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Urn>,
}

impl EntityChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.attributes.is_none()
            && self.owners.is_none()
            && self.domain.is_none()
    }
}

/// Relationship established by a relate operation, from source to target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Relation {
    /// Target becomes the hierarchical parent of the source
    Parent,
    /// Source is placed in the target domain
    Domain,
    /// Target asset is added to the source data product
    DataProductAsset,
    /// Target tag is applied to the source
    Tag,
    /// Target glossary term is applied to the source
    GlossaryTerm,
}

/// A logical change, routed either to direct mutation or to change proposals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum Operation {
    Create {
        kind: EntityKind,
        /// Assigned at execution time when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        urn: Option<Urn>,
        input: EntityInput,
    },
    Update {
        urn: Urn,
        changes: EntityChanges,
    },
    Delete {
        urn: Urn,
    },
    Relate {
        source: Urn,
        relation: Relation,
        target: Urn,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create { .. } => OperationKind::Create,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::Relate { .. } => OperationKind::Relate,
        }
    }

    /// URN the operation targets, if already known
    pub fn target_urn(&self) -> Option<&Urn> {
        match self {
            Operation::Create { urn, .. } => urn.as_ref(),
            Operation::Update { urn, .. } | Operation::Delete { urn } => Some(urn),
            Operation::Relate { source, .. } => Some(source),
        }
    }

    /// URN for a create: the supplied one, else `urn:li:<type>:<id or uuid>`
    pub fn resolve_create_urn(kind: EntityKind, urn: Option<&Urn>, input: &EntityInput) -> Urn {
        match (urn, &input.id) {
            (Some(urn), _) => urn.clone(),
            (None, Some(id)) => Urn::for_entity(kind, id),
            (None, None) => Urn::for_entity(kind, &Uuid::new_v4().to_string()),
        }
    }

    /// Pin the URN of a create, so every path reports the same one
    pub fn resolve_urn(&mut self) {
        if let Operation::Create { kind, urn, input } = self {
            if urn.is_none() {
                *urn = Some(Self::resolve_create_urn(*kind, None, input));
            }
        }
    }

    /// Check required payload fields and URN shapes
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            Operation::Create { kind, urn, input } => {
                input.validate()?;
                if let Some(urn) = urn {
                    urn.ensure_kind(*kind)?;
                }
                if let Some(attributes) = &input.attributes {
                    validate_attributes(*kind, attributes)?;
                }
                Ok(())
            }
            Operation::Update { urn, changes } => {
                let kind = urn.ensure_known()?;
                if changes.is_empty() {
                    return Err(validation_error(format!("Update of {} changes nothing", urn)));
                }
                changes.validate()?;
                if let Some(attributes) = &changes.attributes {
                    validate_attributes(kind, attributes)?;
                }
                if let Some(domain) = &changes.domain {
                    domain.ensure_kind(EntityKind::Domain)?;
                }
                Ok(())
            }
            Operation::Delete { urn } => urn.ensure_known().map(|_| ()),
            Operation::Relate { source, relation, target } => {
                let source_kind = source.ensure_known()?;
                validate_relation(source_kind, *relation, target)
            }
        }
    }
}

fn validate_not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        let mut err = validator::ValidationError::new("blank");
        err.message = Some("Entity name cannot be blank".into());
        return Err(err);
    }
    Ok(())
}

fn validate_attributes(kind: EntityKind, attributes: &EntityAttributes) -> Result<(), AppError> {
    if attributes.kind() != kind {
        return Err(validation_error(format!(
            "{} attributes supplied for a {}",
            attributes.kind(),
            kind
        )));
    }

    match attributes {
        EntityAttributes::Tag { color_hex: Some(color) } if !COLOR_HEX.is_match(color) => Err(
            validation_error(format!("Invalid tag color '{}' (expected #rrggbb)", color)),
        ),
        EntityAttributes::Domain { parent_domain: Some(parent) } => parent.ensure_kind(EntityKind::Domain),
        EntityAttributes::GlossaryNode { parent_node: Some(parent) }
        | EntityAttributes::GlossaryTerm { parent_node: Some(parent), .. } => {
            parent.ensure_kind(EntityKind::GlossaryNode)
        }
        EntityAttributes::DataProduct { domain: Some(domain), .. } => domain.ensure_kind(EntityKind::Domain),
        _ => Ok(()),
    }
}

fn validate_relation(source_kind: EntityKind, relation: Relation, target: &Urn) -> Result<(), AppError> {
    match relation {
        Relation::Parent => {
            let parent_kind = match source_kind {
                EntityKind::Domain => EntityKind::Domain,
                EntityKind::GlossaryNode | EntityKind::GlossaryTerm => EntityKind::GlossaryNode,
                other => {
                    return Err(validation_error(format!("A {} cannot have a parent", other)));
                }
            };
            target.ensure_kind(parent_kind)
        }
        Relation::Domain => target.ensure_kind(EntityKind::Domain),
        Relation::DataProductAsset => {
            if source_kind != EntityKind::DataProduct {
                return Err(validation_error(format!(
                    "Assets can only be added to a data product, not a {}",
                    source_kind
                )));
            }
            if target.entity_type().is_none() {
                return Err(validation_error(format!("Malformed asset URN '{}'", target)));
            }
            Ok(())
        }
        Relation::Tag => target.ensure_kind(EntityKind::Tag),
        Relation::GlossaryTerm => target.ensure_kind(EntityKind::GlossaryTerm),
    }
}

/// An operation as submitted to the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    #[serde(flatten)]
    pub operation: Operation,
    /// Overrides the router's batch mode for this descriptor when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<bool>,
}

impl OperationDescriptor {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            batch: None,
        }
    }

    pub fn batched(operation: Operation, batch: bool) -> Self {
        Self {
            operation,
            batch: Some(batch),
        }
    }
}

impl From<Operation> for OperationDescriptor {
    fn from(operation: Operation) -> Self {
        Self::new(operation)
    }
}
