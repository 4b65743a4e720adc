//! Pull, import and push handlers

use crate::entity::EntityRecord;
use crate::error::ApiResult;
use crate::models::{PullRequest, StatusSummaryResponse, SuccessResponse, UrnRequest};
use crate::pipeline::OperationResult;
use crate::state::SharedState;
use crate::sync::PullReport;
use axum::extract::State;
use axum::Json;

/// Fetch remote snapshots and reconcile them with local records
pub async fn pull(
    State(state): State<SharedState>,
    Json(payload): Json<PullRequest>,
) -> ApiResult<Json<SuccessResponse<PullReport>>> {
    let report = if payload.urns.is_empty() {
        state.sync.pull_all(payload.kind).await?
    } else {
        state.sync.pull(&payload.urns).await?
    };

    Ok(Json(SuccessResponse::with_data(
        format!("Pulled {} entities", report.pulled),
        report,
    )))
}

/// Replace a local copy with its remote snapshot
pub async fn import(
    State(state): State<SharedState>,
    Json(payload): Json<UrnRequest>,
) -> ApiResult<Json<SuccessResponse<EntityRecord>>> {
    let record = state.sync.import(&payload.urn).await?;
    Ok(Json(SuccessResponse::with_data(format!("Imported {}", record.urn), record)))
}

/// Push a local copy through the operation router
pub async fn push(
    State(state): State<SharedState>,
    Json(payload): Json<UrnRequest>,
) -> ApiResult<Json<OperationResult>> {
    let mut router = state.router.lock().await;
    let result = state.sync.push(&payload.urn, &mut router).await?;
    Ok(Json(result))
}

/// Record counts per sync status
pub async fn status_summary(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<StatusSummaryResponse>>> {
    let statuses = state.sync.status_summary().await?;
    Ok(Json(SuccessResponse::with_data(
        "Sync status summary",
        StatusSummaryResponse {
            total: statuses.values().sum(),
            statuses,
        },
    )))
}
