//! Asynchronous planner
//!
//! Translates an operation into change proposals, one per aspect touched.
//! Never talks to the remote catalog.

use crate::catalog::aspects;
use crate::entity::{EntityAttributes, EntityKind, EntitySnapshot, Urn};
use crate::error::AppError;
use crate::pipeline::{EntityChanges, Operation, Relation};
use crate::proposal::{ChangeProposalRecord, ChangeType, ProposalBuilder};
use serde_json::{json, Map, Value};

/// Proposals for `operation`, in the order they should be applied
pub fn plan(operation: &Operation) -> Result<(Urn, Vec<ChangeProposalRecord>), AppError> {
    match operation {
        Operation::Create { kind, urn, input } => {
            let urn = Operation::resolve_create_urn(*kind, urn.as_ref(), input);
            let snapshot = EntitySnapshot::new(
                input.name.trim(),
                input.description.clone(),
                input
                    .attributes
                    .clone()
                    .unwrap_or_else(|| EntityAttributes::empty(*kind)),
            );

            let mut records = vec![ProposalBuilder::build(
                &urn,
                kind.properties_aspect(),
                Value::Object(snapshot.to_aspect()),
            )];
            if !input.owners.is_empty() {
                records.push(ProposalBuilder::build(
                    &urn,
                    aspects::OWNERSHIP,
                    json!({ "owners": input.owners }),
                ));
            }
            Ok((urn, records))
        }
        Operation::Update { urn, changes } => {
            let kind = urn.ensure_known()?;
            Ok((urn.clone(), update_records(urn, kind, changes)))
        }
        Operation::Delete { urn } => {
            let kind = urn.ensure_known()?;
            let record = ProposalBuilder::build_with(urn, &kind.key_aspect(), Value::Null, ChangeType::Delete, None);
            Ok((urn.clone(), vec![record]))
        }
        Operation::Relate { source, relation, target } => {
            let kind = source.ensure_known()?;
            Ok((source.clone(), vec![relate_record(source, kind, *relation, target)?]))
        }
    }
}

fn update_records(urn: &Urn, kind: EntityKind, changes: &EntityChanges) -> Vec<ChangeProposalRecord> {
    let mut records = Vec::new();

    let mut properties = Map::new();
    if let Some(name) = &changes.name {
        properties.insert("name".to_string(), Value::String(name.trim().to_string()));
    }
    if let Some(description) = &changes.description {
        properties.insert("description".to_string(), Value::String(description.clone()));
    }
    if let Some(attributes) = &changes.attributes {
        properties.extend(attributes.to_fields());
    }
    if !properties.is_empty() {
        records.push(ProposalBuilder::build(urn, kind.properties_aspect(), Value::Object(properties)));
    }

    if let Some(owners) = &changes.owners {
        records.push(ProposalBuilder::build(urn, aspects::OWNERSHIP, json!({ "owners": owners })));
    }
    if let Some(domain) = &changes.domain {
        records.push(ProposalBuilder::build(urn, aspects::DOMAINS, json!({ "domains": [domain] })));
    }

    records
}

fn relate_record(
    source: &Urn,
    kind: EntityKind,
    relation: Relation,
    target: &Urn,
) -> Result<ChangeProposalRecord, AppError> {
    let record = match relation {
        Relation::Parent => {
            let field = EntityAttributes::parent_field(kind)
                .ok_or_else(|| AppError::Validation(format!("A {} cannot have a parent", kind)))?;
            let mut payload = Map::new();
            payload.insert(field.to_string(), Value::String(target.to_string()));
            ProposalBuilder::build(source, kind.properties_aspect(), Value::Object(payload))
        }
        Relation::Domain => ProposalBuilder::build(source, aspects::DOMAINS, json!({ "domains": [target] })),
        Relation::DataProductAsset => {
            ProposalBuilder::build(source, aspects::DATA_PRODUCT_ASSETS, json!({ "assets": [target] }))
        }
        Relation::Tag => ProposalBuilder::build(source, aspects::GLOBAL_TAGS, json!({ "tags": [{ "tag": target }] })),
        Relation::GlossaryTerm => {
            ProposalBuilder::build(source, aspects::GLOSSARY_TERMS, json!({ "terms": [{ "urn": target }] }))
        }
    };
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Owner;
    use crate::pipeline::EntityInput;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_is_one_properties_aspect() {
        let mut input = EntityInput::named(" PII ");
        input.id = Some("pii".into());
        let (urn, records) = plan(&Operation::Create { kind: EntityKind::Tag, urn: None, input }).unwrap();

        assert_eq!(urn.as_str(), "urn:li:tag:pii");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].aspect_name, "tagProperties");
        assert_eq!(records[0].entity_type, "tag");
        assert_eq!(records[0].aspect, json!({ "name": "PII" }));
    }

    #[test]
    fn test_update_one_proposal_per_aspect() {
        let urn = Urn::from("urn:li:domain:finance");
        let changes = EntityChanges {
            description: Some("Money".into()),
            owners: Some(vec![Owner {
                owner: Urn::from("urn:li:corpuser:alice"),
                ownership_type: "TECHNICAL_OWNER".into(),
            }]),
            ..Default::default()
        };
        let (_, records) = plan(&Operation::Update { urn, changes }).unwrap();

        let names: Vec<_> = records.iter().map(|r| r.aspect_name.as_str()).collect();
        assert_eq!(names, vec!["domainProperties", "ownership"]);
        assert_eq!(records[0].aspect, json!({ "description": "Money" }));
    }

    #[test]
    fn test_delete_targets_key_aspect() {
        let (_, records) = plan(&Operation::Delete { urn: Urn::from("urn:li:glossaryTerm:revenue") }).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].aspect_name, "glossaryTermKey");
        assert_eq!(records[0].change_type, ChangeType::Delete);
        assert_eq!(records[0].aspect, Value::Null);
    }

    #[test]
    fn test_relate_parent_uses_kind_field() {
        let op = Operation::Relate {
            source: Urn::from("urn:li:glossaryTerm:revenue"),
            relation: Relation::Parent,
            target: Urn::from("urn:li:glossaryNode:finance"),
        };
        let (urn, records) = plan(&op).unwrap();
        assert_eq!(urn.as_str(), "urn:li:glossaryTerm:revenue");
        assert_eq!(records[0].aspect_name, "glossaryTermInfo");
        assert_eq!(records[0].aspect, json!({ "parentNode": "urn:li:glossaryNode:finance" }));
    }
}
