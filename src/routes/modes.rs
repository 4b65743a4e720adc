//! Routing mode handlers

use crate::error::ApiResult;
use crate::models::{BatchResponse, ModesResponse, SuccessResponse, UpdateModesRequest};
use crate::state::SharedState;
use axum::extract::State;
use axum::Json;
use tracing::info;

/// Current routing modes
pub async fn get_modes(State(state): State<SharedState>) -> ApiResult<Json<SuccessResponse<ModesResponse>>> {
    let router = state.router.lock().await;
    Ok(Json(SuccessResponse::with_data(
        "Current modes",
        ModesResponse {
            modes: router.config().clone(),
            flushed: None,
        },
    )))
}

/// Change routing modes; turning batch mode off flushes the queue
pub async fn update_modes(
    State(state): State<SharedState>,
    Json(payload): Json<UpdateModesRequest>,
) -> ApiResult<Json<SuccessResponse<ModesResponse>>> {
    let mut router = state.router.lock().await;

    if let Some(sync_mode) = payload.sync_mode {
        router.set_sync_mode(sync_mode);
    }
    if payload.emit_to_file.is_some() || payload.output_dir.is_some() {
        let emit_to_file = payload.emit_to_file.unwrap_or(router.config().emit_to_file);
        let output_dir = payload.output_dir.or_else(|| router.config().output_dir.clone());
        router.set_output_mode(emit_to_file, output_dir);
    }
    let flushed = match payload.batch_mode {
        Some(batch_mode) => router.set_batch_mode(batch_mode).await,
        None => None,
    };

    info!("Modes updated: {:?}", router.config());
    Ok(Json(SuccessResponse::with_data(
        "Modes updated",
        ModesResponse {
            modes: router.config().clone(),
            flushed: flushed.map(BatchResponse::from),
        },
    )))
}
