//! Local entity handlers

use crate::entity::{EntityRecord, Urn};
use crate::error::{not_found_error, ApiResult};
use crate::models::{EntityListQuery, EntityListResponse, SuccessResponse, UpsertEntityRequest};
use crate::state::SharedState;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::{json, Value};
use validator::Validate;

/// List local records, optionally filtered by kind and status
pub async fn list_entities(
    State(state): State<SharedState>,
    Query(query): Query<EntityListQuery>,
) -> ApiResult<Json<SuccessResponse<EntityListResponse>>> {
    let entities: Vec<EntityRecord> = match query.status {
        Some(status) => state
            .store
            .list_by_status(status)
            .await?
            .into_iter()
            .filter(|r| query.kind.map_or(true, |kind| r.kind == kind))
            .collect(),
        None => state.sync.list(query.kind).await?,
    };

    Ok(Json(SuccessResponse::with_data(
        format!("{} entities", entities.len()),
        EntityListResponse {
            count: entities.len(),
            entities,
        },
    )))
}

/// Create or edit a local entity
pub async fn upsert_entity(
    State(state): State<SharedState>,
    Json(payload): Json<UpsertEntityRequest>,
) -> ApiResult<Json<SuccessResponse<EntityRecord>>> {
    payload.validate()?;
    let (urn, snapshot) = payload.into_parts();
    let record = state.sync.upsert_local(urn, snapshot).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Entity {} saved ({})", record.urn, record.sync_status),
        record,
    )))
}

pub async fn get_entity(
    State(state): State<SharedState>,
    Path(urn): Path<String>,
) -> ApiResult<Json<SuccessResponse<EntityRecord>>> {
    let urn = Urn::from(urn);
    let record = state
        .sync
        .get(&urn)
        .await?
        .ok_or_else(|| not_found_error(format!("Entity {} not found", urn)))?;
    Ok(Json(SuccessResponse::with_data("Entity found", record)))
}

/// Delete the local copy; the remote catalog is not touched
pub async fn delete_entity(
    State(state): State<SharedState>,
    Path(urn): Path<String>,
) -> ApiResult<Json<SuccessResponse<Value>>> {
    let urn = Urn::from(urn);
    if !state.sync.delete_local(&urn).await? {
        return Err(not_found_error(format!("Entity {} not found", urn)));
    }
    Ok(Json(SuccessResponse::with_data(
        format!("Entity {} deleted", urn),
        json!({ "urn": urn }),
    )))
}
