//! Entity URNs
//!
//! URNs are opaque identifiers. Well-formed ones follow
//! `urn:li:<entityType>:<id>`, and the entity type segment is what the
//! proposal builder and the stores use to recover an entity's kind.

use crate::entity::EntityKind;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

const URN_PREFIX: &str = "urn:li:";

/// Opaque entity identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Urn(String);

impl Urn {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Build `urn:li:<entityType>:<id>` for a kind
    pub fn for_entity(kind: EntityKind, id: &str) -> Self {
        Self(format!("{}{}:{}", URN_PREFIX, kind.entity_type(), id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The third `:`-separated segment, if the URN has at least three
    pub fn entity_type(&self) -> Option<&str> {
        let mut parts = self.0.splitn(4, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(_), Some(entity_type)) if !entity_type.is_empty() => Some(entity_type),
            _ => None,
        }
    }

    /// Everything after the entity type segment. Ids may contain `:`.
    pub fn id(&self) -> Option<&str> {
        self.0.splitn(4, ':').nth(3).filter(|id| !id.is_empty())
    }

    pub fn kind(&self) -> Option<EntityKind> {
        self.entity_type().and_then(EntityKind::from_entity_type)
    }

    /// Check that this URN is well-formed and names an entity of `kind`
    pub fn ensure_kind(&self, kind: EntityKind) -> Result<(), AppError> {
        let actual = self.ensure_known()?;
        if actual != kind {
            return Err(AppError::Validation(format!(
                "URN {} names a {} but a {} was expected",
                self, actual, kind
            )));
        }
        Ok(())
    }

    /// Check that this URN is well-formed and names a supported kind
    pub fn ensure_known(&self) -> Result<EntityKind, AppError> {
        if !self.0.starts_with(URN_PREFIX) || self.id().is_none() {
            return Err(AppError::Validation(format!(
                "Malformed URN '{}' (expected urn:li:<entityType>:<id>)",
                self
            )));
        }
        self.kind().ok_or_else(|| {
            AppError::Validation(format!(
                "URN '{}' has unsupported entity type '{}'",
                self,
                self.entity_type().unwrap_or_default()
            ))
        })
    }

    /// Filesystem-friendly rendering, used for staged file names
    pub fn slug(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Urn {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Urn {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
