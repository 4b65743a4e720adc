//! In-process catalog
//!
//! Holds catalog entities in memory and applies both direct mutations and
//! change proposals to them. The server uses it as a loopback remote when
//! no external catalog is wired in; tests use it to script rejections and
//! outages.

use super::{aspects, mutations, MutationResponse, ProposalSink, RemoteCatalog};
use crate::entity::{EntityAttributes, EntityKind, EntitySnapshot, MutationVerb, Owner, Urn};
use crate::error::AppError;
use crate::proposal::{ChangeProposalRecord, ChangeType};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Remote-side view of one entity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntity {
    urn: Urn,
    #[serde(flatten)]
    snapshot: EntitySnapshot,
    owners: Vec<Owner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<Urn>,
    tags: Vec<Urn>,
    glossary_terms: Vec<Urn>,
}

impl CatalogEntity {
    fn new(urn: Urn, snapshot: EntitySnapshot) -> Self {
        Self {
            urn,
            snapshot,
            owners: Vec::new(),
            domain: None,
            tags: Vec::new(),
            glossary_terms: Vec::new(),
        }
    }

    fn set_domain(&mut self, domain: Option<Urn>) {
        match &mut self.snapshot.attributes {
            EntityAttributes::DataProduct { domain: product_domain, .. } => *product_domain = domain,
            _ => self.domain = domain,
        }
    }

    fn add_assets(&mut self, new_assets: Vec<Urn>) -> Result<(), String> {
        match &mut self.snapshot.attributes {
            EntityAttributes::DataProduct { assets, .. } => {
                union_into(assets, new_assets);
                Ok(())
            }
            other => Err(format!("{} is a {}, not a data product", self.urn, other.kind())),
        }
    }
}

fn union_into(target: &mut Vec<Urn>, values: Vec<Urn>) {
    for value in values {
        if !target.contains(&value) {
            target.push(value);
        }
    }
}

type Entities = BTreeMap<Urn, CatalogEntity>;

pub struct InMemoryCatalog {
    entities: RwLock<Entities>,
    /// Mutation name -> error text to reply with
    rejections: RwLock<HashMap<String, String>>,
    executed: RwLock<Vec<String>>,
    received: RwLock<Vec<ChangeProposalRecord>>,
    unreachable: AtomicBool,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
            rejections: RwLock::new(HashMap::new()),
            executed: RwLock::new(Vec::new()),
            received: RwLock::new(Vec::new()),
            unreachable: AtomicBool::new(false),
        }
    }

    /// Place an entity in the catalog without going through a mutation
    pub async fn seed(&self, urn: Urn, snapshot: EntitySnapshot) {
        let mut entities = self.entities.write().await;
        entities.insert(urn.clone(), CatalogEntity::new(urn, snapshot));
    }

    pub async fn remove(&self, urn: &Urn) -> bool {
        self.entities.write().await.remove(urn).is_some()
    }

    pub async fn snapshot(&self, urn: &Urn) -> Option<EntitySnapshot> {
        self.entities.read().await.get(urn).map(|e| e.snapshot.clone())
    }

    pub async fn owners(&self, urn: &Urn) -> Vec<Owner> {
        self.entities
            .read()
            .await
            .get(urn)
            .map(|e| e.owners.clone())
            .unwrap_or_default()
    }

    /// Make every later `name` mutation fail with `error`
    pub async fn reject_mutation(&self, name: &str, error: &str) {
        self.rejections
            .write()
            .await
            .insert(name.to_string(), error.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Names of every mutation received, in order
    pub async fn executed_mutations(&self) -> Vec<String> {
        self.executed.read().await.clone()
    }

    pub async fn received_proposals(&self) -> Vec<ChangeProposalRecord> {
        self.received.read().await.clone()
    }

    fn ensure_reachable(&self) -> Result<(), AppError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::Connectivity("catalog connection refused".to_string()));
        }
        Ok(())
    }

    fn apply_mutation(entities: &mut Entities, name: &str, input: &Value) -> Result<Value, String> {
        if let Some((verb, kind)) = EntityKind::from_mutation(name) {
            return match verb {
                MutationVerb::Create => Self::create(entities, kind, input),
                MutationVerb::Delete => {
                    let urn = urn_field(input, "urn")?;
                    entities
                        .remove(&urn)
                        .map(|_| json!({ "urn": urn }))
                        .ok_or_else(|| format!("Entity {} not found", urn))
                }
            };
        }

        let urn = urn_field(input, "urn");
        match name {
            mutations::UPDATE_NAME => {
                let entity = existing(entities, &urn?)?;
                entity.snapshot.name = str_field(input, "name")?.to_string();
            }
            mutations::UPDATE_DESCRIPTION => {
                let entity = existing(entities, &urn?)?;
                entity.snapshot.description = input.get("description").and_then(Value::as_str).map(str::to_string);
            }
            mutations::UPDATE_PROPERTIES => {
                let entity = existing(entities, &urn?)?;
                let properties = input
                    .get("properties")
                    .and_then(Value::as_object)
                    .ok_or("Missing field 'properties'")?;
                entity.snapshot.apply_aspect(properties).map_err(|e| e.to_string())?;
            }
            mutations::UPDATE_OWNERS => {
                let entity = existing(entities, &urn?)?;
                entity.owners = serde_json::from_value(input.get("owners").cloned().unwrap_or_default())
                    .map_err(|e| format!("Invalid owners: {}", e))?;
            }
            mutations::SET_DOMAIN => {
                let domain = optional_urn(input, "domain");
                existing(entities, &urn?)?.set_domain(domain);
            }
            mutations::SET_PARENT => {
                let parent = optional_urn(input, "parent");
                existing(entities, &urn?)?
                    .snapshot
                    .attributes
                    .set_parent(parent)
                    .map_err(|e| e.to_string())?;
            }
            mutations::BATCH_SET_DATA_PRODUCT => {
                let product = urn_field(input, "dataProductUrn")?;
                let resources: Vec<Urn> =
                    serde_json::from_value(input.get("resourceUrns").cloned().unwrap_or_default())
                        .map_err(|e| format!("Invalid resourceUrns: {}", e))?;
                existing(entities, &product)?.add_assets(resources)?;
                return Ok(json!({ "urn": product }));
            }
            mutations::ADD_TAG => {
                let tag = urn_field(input, "tagUrn")?;
                union_into(&mut existing(entities, &urn?)?.tags, vec![tag]);
            }
            mutations::ADD_TERM => {
                let term = urn_field(input, "termUrn")?;
                union_into(&mut existing(entities, &urn?)?.glossary_terms, vec![term]);
            }
            other => return Err(format!("Unknown mutation '{}'", other)),
        }

        Ok(json!({ "urn": urn_field(input, "urn")? }))
    }

    fn create(entities: &mut Entities, kind: EntityKind, input: &Value) -> Result<Value, String> {
        let urn = match optional_urn(input, "urn") {
            Some(urn) => urn,
            None => Urn::for_entity(kind, &Uuid::new_v4().to_string()),
        };
        if entities.contains_key(&urn) {
            return Err(format!("Entity {} already exists", urn));
        }

        let attributes = match input.get("attributes") {
            Some(value) if !value.is_null() => serde_json::from_value::<EntityAttributes>(value.clone())
                .map_err(|e| format!("Invalid attributes: {}", e))?,
            _ => EntityAttributes::empty(kind),
        };
        if attributes.kind() != kind {
            return Err(format!("Cannot create a {} with {} attributes", kind, attributes.kind()));
        }

        let snapshot = EntitySnapshot::new(
            str_field(input, "name")?,
            input.get("description").and_then(Value::as_str).map(str::to_string),
            attributes,
        );
        entities.insert(urn.clone(), CatalogEntity::new(urn.clone(), snapshot));
        Ok(json!({ "urn": urn }))
    }

    fn apply_proposal(entities: &mut Entities, record: &ChangeProposalRecord) -> Result<(), String> {
        let urn = &record.entity_urn;
        if record.is_unknown_type() {
            return Err(format!("Cannot apply proposal for {}: no entity type", urn));
        }
        let kind = urn
            .kind()
            .ok_or_else(|| format!("Cannot apply proposal for entity type '{}'", record.entity_type))?;

        if record.change_type == ChangeType::Delete {
            if record.aspect_name != kind.key_aspect() {
                return Err(format!("Deleting aspect {} is not supported", record.aspect_name));
            }
            entities.remove(urn);
            return Ok(());
        }

        let payload = record
            .aspect
            .as_object()
            .ok_or_else(|| format!("Aspect {} payload must be an object", record.aspect_name))?;

        if record.aspect_name == kind.properties_aspect() {
            return match entities.get_mut(urn) {
                Some(entity) => entity.snapshot.apply_aspect(payload).map_err(|e| e.to_string()),
                None => {
                    let mut snapshot = EntitySnapshot::new("", None, EntityAttributes::empty(kind));
                    snapshot.apply_aspect(payload).map_err(|e| e.to_string())?;
                    if snapshot.name.trim().is_empty() {
                        return Err(format!("Cannot create {} without a name", urn));
                    }
                    entities.insert(urn.clone(), CatalogEntity::new(urn.clone(), snapshot));
                    Ok(())
                }
            };
        }

        let entity = existing(entities, urn)?;
        match record.aspect_name.as_str() {
            aspects::OWNERSHIP => {
                entity.owners = serde_json::from_value(payload.get("owners").cloned().unwrap_or_default())
                    .map_err(|e| format!("Invalid ownership aspect: {}", e))?;
            }
            aspects::DOMAINS => {
                let domain = payload
                    .get("domains")
                    .and_then(Value::as_array)
                    .and_then(|d| d.first())
                    .and_then(Value::as_str)
                    .map(Urn::from);
                entity.set_domain(domain);
            }
            aspects::GLOBAL_TAGS => union_into(&mut entity.tags, nested_urns(payload, "tags", "tag")),
            aspects::GLOSSARY_TERMS => {
                union_into(&mut entity.glossary_terms, nested_urns(payload, "terms", "urn"))
            }
            aspects::DATA_PRODUCT_ASSETS => {
                let assets: Vec<Urn> = serde_json::from_value(payload.get("assets").cloned().unwrap_or_default())
                    .map_err(|e| format!("Invalid assets: {}", e))?;
                entity.add_assets(assets)?;
            }
            other => return Err(format!("Unsupported aspect '{}'", other)),
        }
        Ok(())
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn existing<'a>(entities: &'a mut Entities, urn: &Urn) -> Result<&'a mut CatalogEntity, String> {
    entities
        .get_mut(urn)
        .ok_or_else(|| format!("Entity {} not found", urn))
}

fn str_field<'a>(input: &'a Value, key: &str) -> Result<&'a str, String> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing field '{}'", key))
}

fn urn_field(input: &Value, key: &str) -> Result<Urn, String> {
    str_field(input, key).map(Urn::from)
}

fn optional_urn(input: &Value, key: &str) -> Option<Urn> {
    input.get(key).and_then(Value::as_str).map(Urn::from)
}

fn nested_urns(payload: &Map<String, Value>, list: &str, key: &str) -> Vec<Urn> {
    payload
        .get(list)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(key).and_then(Value::as_str))
                .map(Urn::from)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl RemoteCatalog for InMemoryCatalog {
    async fn execute_mutation(&self, name: &str, input: Value) -> Result<MutationResponse, AppError> {
        self.ensure_reachable()?;
        self.executed.write().await.push(name.to_string());

        if let Some(error) = self.rejections.read().await.get(name) {
            debug!("Rejecting mutation {} as scripted", name);
            return Ok(MutationResponse::failed(error.clone()));
        }

        let mut entities = self.entities.write().await;
        Ok(match Self::apply_mutation(&mut entities, name, &input) {
            Ok(data) => MutationResponse::ok(data),
            Err(error) => MutationResponse::failed(error),
        })
    }

    async fn fetch_entity(&self, urn: &Urn) -> Result<Option<Value>, AppError> {
        self.ensure_reachable()?;
        let entities = self.entities.read().await;
        entities
            .get(urn)
            .map(|entity| serde_json::to_value(entity).map_err(AppError::from))
            .transpose()
    }

    async fn list_entities(&self, kind: EntityKind) -> Result<Vec<Urn>, AppError> {
        self.ensure_reachable()?;
        let entities = self.entities.read().await;
        Ok(entities
            .values()
            .filter(|e| e.snapshot.kind() == kind)
            .map(|e| e.urn.clone())
            .collect())
    }
}

#[async_trait]
impl ProposalSink for InMemoryCatalog {
    async fn emit_proposals(&self, records: &[ChangeProposalRecord]) -> Result<bool, AppError> {
        self.ensure_reachable()?;

        let mut entities = self.entities.write().await;
        let mut accepted = true;
        for record in records {
            if let Err(error) = Self::apply_proposal(&mut entities, record) {
                warn!("Proposal {} on {} rejected: {}", record.aspect_name, record.entity_urn, error);
                accepted = false;
            }
        }

        self.received.write().await.extend_from_slice(records);
        Ok(accepted)
    }
}
