//! Synchronous executor
//!
//! Runs an operation as one or more direct mutations against the remote
//! catalog. Sub-steps run in order and the first failure aborts the rest;
//! steps already applied stay applied.

use crate::catalog::{mutations, MutationResponse, RemoteCatalog};
use crate::entity::{EntityAttributes, EntityKind, Urn};
use crate::error::AppError;
use crate::pipeline::{EntityChanges, EntityInput, Operation, OperationKind, OperationResult, Relation};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// One mutation of a multi-step operation
struct Step {
    name: String,
    input: Value,
}

impl Step {
    fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}

pub struct DirectExecutor<'a> {
    catalog: &'a dyn RemoteCatalog,
}

impl<'a> DirectExecutor<'a> {
    pub fn new(catalog: &'a dyn RemoteCatalog) -> Self {
        Self { catalog }
    }

    pub async fn execute(&self, operation: &Operation) -> Result<OperationResult, AppError> {
        let kind = operation.kind();
        match operation {
            Operation::Create { kind: entity_kind, urn, input } => {
                let urn = Operation::resolve_create_urn(*entity_kind, urn.as_ref(), input);
                self.create(*entity_kind, urn, input).await
            }
            Operation::Update { urn, changes } => {
                let steps = update_steps(urn, changes);
                let data = self.run_steps(urn, &steps).await?;
                Ok(OperationResult::succeeded(kind, Some(urn.clone())).with_data(data))
            }
            Operation::Delete { urn } => {
                let entity_kind = urn.ensure_known()?;
                let step = Step::new(entity_kind.delete_mutation(), json!({ "urn": urn }));
                let data = self.run_steps(urn, &[step]).await?;
                Ok(OperationResult::succeeded(kind, Some(urn.clone())).with_data(data))
            }
            Operation::Relate { source, relation, target } => {
                let step = relate_step(source, *relation, target);
                let data = self.run_steps(source, &[step]).await?;
                Ok(OperationResult::succeeded(kind, Some(source.clone())).with_data(data))
            }
        }
    }

    async fn create(&self, kind: EntityKind, urn: Urn, input: &EntityInput) -> Result<OperationResult, AppError> {
        let attributes = input
            .attributes
            .clone()
            .unwrap_or_else(|| EntityAttributes::empty(kind));

        let create = Step::new(
            kind.create_mutation(),
            json!({
                "urn": urn,
                "name": input.name.trim(),
                "description": input.description,
                "attributes": attributes,
            }),
        );
        let data = self.run_steps(&urn, &[create]).await?;

        // The catalog may assign its own URN
        let urn = data
            .get("urn")
            .and_then(Value::as_str)
            .map(Urn::from)
            .unwrap_or(urn);

        if !input.owners.is_empty() {
            let owners = Step::new(
                mutations::UPDATE_OWNERS,
                json!({ "urn": urn, "owners": input.owners }),
            );
            if let Err(e) = self.run_steps(&urn, &[owners]).await {
                // the entity exists remotely; the failure must still name it
                warn!("{} created but setting owners failed: {}", urn, e);
                return Ok(OperationResult::failed(OperationKind::Create, Some(urn), e.to_string()).with_data(data));
            }
        }

        Ok(OperationResult::succeeded(OperationKind::Create, Some(urn)).with_data(data))
    }

    /// Execute steps in order, stopping at the first failure.
    /// Returns the data of the last step.
    async fn run_steps(&self, urn: &Urn, steps: &[Step]) -> Result<Value, AppError> {
        let mut data = Value::Null;

        for (index, step) in steps.iter().enumerate() {
            debug!("Executing {} on {}", step.name, urn);
            let response = self.catalog.execute_mutation(&step.name, step.input.clone()).await?;

            match response {
                MutationResponse { success: true, data: step_data, .. } => {
                    data = step_data.unwrap_or(Value::Null);
                }
                MutationResponse { error, .. } => {
                    if index > 0 {
                        warn!(
                            "{} failed at {} after {} of {} steps were applied; earlier steps are not rolled back",
                            urn,
                            step.name,
                            index,
                            steps.len()
                        );
                    }
                    return Err(AppError::Remote(
                        error.unwrap_or_else(|| format!("Mutation {} failed", step.name)),
                    ));
                }
            }
        }

        Ok(data)
    }
}

fn update_steps(urn: &Urn, changes: &EntityChanges) -> Vec<Step> {
    let mut steps = Vec::new();

    if let Some(name) = &changes.name {
        steps.push(Step::new(mutations::UPDATE_NAME, json!({ "urn": urn, "name": name.trim() })));
    }
    if let Some(description) = &changes.description {
        steps.push(Step::new(
            mutations::UPDATE_DESCRIPTION,
            json!({ "urn": urn, "description": description }),
        ));
    }
    if let Some(attributes) = &changes.attributes {
        steps.push(Step::new(
            mutations::UPDATE_PROPERTIES,
            json!({ "urn": urn, "properties": attributes.to_fields() }),
        ));
    }
    if let Some(owners) = &changes.owners {
        steps.push(Step::new(mutations::UPDATE_OWNERS, json!({ "urn": urn, "owners": owners })));
    }
    if let Some(domain) = &changes.domain {
        steps.push(Step::new(mutations::SET_DOMAIN, json!({ "urn": urn, "domain": domain })));
    }

    steps
}

fn relate_step(source: &Urn, relation: Relation, target: &Urn) -> Step {
    match relation {
        Relation::Parent => Step::new(mutations::SET_PARENT, json!({ "urn": source, "parent": target })),
        Relation::Domain => Step::new(mutations::SET_DOMAIN, json!({ "urn": source, "domain": target })),
        Relation::DataProductAsset => Step::new(
            mutations::BATCH_SET_DATA_PRODUCT,
            json!({ "dataProductUrn": source, "resourceUrns": [target] }),
        ),
        Relation::Tag => Step::new(mutations::ADD_TAG, json!({ "urn": source, "tagUrn": target })),
        Relation::GlossaryTerm => Step::new(mutations::ADD_TERM, json!({ "urn": source, "termUrn": target })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::entity::{EntitySnapshot, Owner};
    use pretty_assertions::assert_eq;

    fn tag_snapshot(name: &str) -> EntitySnapshot {
        EntitySnapshot::new(name, None, EntityAttributes::empty(EntityKind::Tag))
    }

    #[tokio::test]
    async fn test_create_with_owners() {
        let catalog = InMemoryCatalog::new();
        let mut input = EntityInput::named("PII");
        input.id = Some("pii".into());
        input.owners = vec![Owner {
            owner: Urn::from("urn:li:corpuser:alice"),
            ownership_type: "DATA_STEWARD".into(),
        }];

        let op = Operation::Create { kind: EntityKind::Tag, urn: None, input };
        let result = DirectExecutor::new(&catalog).execute(&op).await.unwrap();

        assert!(result.success);
        assert_eq!(result.operation, OperationKind::Create);
        assert_eq!(result.target_urn, Some(Urn::from("urn:li:tag:pii")));
        assert_eq!(catalog.executed_mutations().await, vec!["createTag", "updateOwners"]);
        assert_eq!(catalog.owners(&Urn::from("urn:li:tag:pii")).await.len(), 1);
    }

    #[tokio::test]
    async fn test_owners_failure_after_create_keeps_urn() {
        let catalog = InMemoryCatalog::new();
        catalog.reject_mutation("updateOwners", "no such owner").await;
        let mut input = EntityInput::named("PII");
        input.owners = vec![Owner {
            owner: Urn::from("urn:li:corpuser:ghost"),
            ownership_type: "TECHNICAL_OWNER".into(),
        }];

        let op = Operation::Create { kind: EntityKind::Tag, urn: None, input };
        let result = DirectExecutor::new(&catalog).execute(&op).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("no such owner"));
        let urn = result.target_urn.expect("created urn is reported");
        assert_eq!(urn.kind(), Some(EntityKind::Tag));
        assert_eq!(catalog.snapshot(&urn).await.map(|s| s.name), Some("PII".to_string()));
        assert_eq!(catalog.executed_mutations().await, vec!["createTag", "updateOwners"]);
    }

    #[tokio::test]
    async fn test_update_steps_in_order() {
        let catalog = InMemoryCatalog::new();
        let urn = Urn::from("urn:li:tag:pii");
        catalog.seed(urn.clone(), tag_snapshot("PII")).await;

        let op = Operation::Update {
            urn: urn.clone(),
            changes: EntityChanges {
                name: Some("Sensitive".into()),
                description: Some("Personal data".into()),
                attributes: Some(EntityAttributes::Tag { color_hex: Some("#ff0000".into()) }),
                ..Default::default()
            },
        };
        let result = DirectExecutor::new(&catalog).execute(&op).await.unwrap();
        assert!(result.success);
        assert_eq!(
            catalog.executed_mutations().await,
            vec!["updateName", "updateDescription", "updateProperties"]
        );

        let remote = catalog.snapshot(&urn).await.unwrap();
        assert_eq!(remote.name, "Sensitive");
        assert_eq!(remote.attributes, EntityAttributes::Tag { color_hex: Some("#ff0000".into()) });
    }

    #[tokio::test]
    async fn test_partial_failure_is_not_rolled_back() {
        let catalog = InMemoryCatalog::new();
        let urn = Urn::from("urn:li:domain:finance");
        catalog
            .seed(urn.clone(), EntitySnapshot::new("Finance", None, EntityAttributes::empty(EntityKind::Domain)))
            .await;
        catalog.reject_mutation("updateOwners", "owner urn:li:corpuser:ghost does not exist").await;

        let op = Operation::Update {
            urn: urn.clone(),
            changes: EntityChanges {
                description: Some("Money".into()),
                owners: Some(vec![Owner {
                    owner: Urn::from("urn:li:corpuser:ghost"),
                    ownership_type: "TECHNICAL_OWNER".into(),
                }]),
                domain: Some(Urn::from("urn:li:domain:root")),
                ..Default::default()
            },
        };
        let err = DirectExecutor::new(&catalog).execute(&op).await.unwrap_err();
        assert_eq!(err.to_string(), "owner urn:li:corpuser:ghost does not exist");

        // description applied, setDomain never attempted
        assert_eq!(catalog.snapshot(&urn).await.unwrap().description.as_deref(), Some("Money"));
        assert_eq!(catalog.executed_mutations().await, vec!["updateDescription", "updateOwners"]);
    }

    #[tokio::test]
    async fn test_relate_asset() {
        let catalog = InMemoryCatalog::new();
        let product = Urn::from("urn:li:dataProduct:orders");
        catalog
            .seed(
                product.clone(),
                EntitySnapshot::new("Orders", None, EntityAttributes::empty(EntityKind::DataProduct)),
            )
            .await;

        let op = Operation::Relate {
            source: product.clone(),
            relation: Relation::DataProductAsset,
            target: Urn::from("urn:li:dataset:orders_raw"),
        };
        DirectExecutor::new(&catalog).execute(&op).await.unwrap();

        let remote = catalog.snapshot(&product).await.unwrap();
        assert_eq!(
            remote.attributes,
            EntityAttributes::DataProduct {
                domain: None,
                assets: vec![Urn::from("urn:li:dataset:orders_raw")],
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_an_error() {
        let catalog = InMemoryCatalog::new();
        catalog.set_unreachable(true);
        let op = Operation::Delete { urn: Urn::from("urn:li:tag:pii") };
        let err = DirectExecutor::new(&catalog).execute(&op).await.unwrap_err();
        assert!(matches!(err, AppError::Connectivity(_)));
    }
}
