//! Change-proposal buffer handlers

use crate::error::ApiResult;
use crate::models::{
    EmitDirectRequest, EmitDirectResponse, EmitFileRequest, EmitFileResponse, ProposalListResponse,
    SuccessResponse,
};
use crate::proposal::OutputFormat;
use crate::state::SharedState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use validator::Validate;

/// Buffered proposals in emission order
pub async fn list_proposals(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<ProposalListResponse>>> {
    let router = state.router.lock().await;
    let proposals = router.buffered_proposals().to_vec();
    Ok(Json(SuccessResponse::with_data(
        "Buffered proposals",
        ProposalListResponse {
            count: proposals.len(),
            proposals,
        },
    )))
}

/// Drop every buffered proposal
pub async fn clear_proposals(State(state): State<SharedState>) -> ApiResult<Json<SuccessResponse<Value>>> {
    let mut router = state.router.lock().await;
    let cleared = router.emitter_mut().clear();
    Ok(Json(SuccessResponse::with_data(
        format!("Cleared {} proposals", cleared),
        json!({ "cleared": cleared }),
    )))
}

/// Write the buffer to a file in the output directory
pub async fn emit_to_file(
    State(state): State<SharedState>,
    Json(payload): Json<EmitFileRequest>,
) -> ApiResult<Json<SuccessResponse<EmitFileResponse>>> {
    payload.validate()?;
    let format: OutputFormat = match payload.format.as_deref() {
        Some(format) => format.parse()?,
        None => state.proposal_format,
    };

    let mut router = state.router.lock().await;
    let path = router.emitter().emit_to_file(&payload.filename, format).await?;
    let count = router.buffered_proposals().len();
    if payload.clear {
        router.emitter_mut().clear();
    }

    Ok(Json(SuccessResponse::with_data(
        format!("Emitted {} proposals", count),
        EmitFileResponse {
            path,
            format,
            count,
            cleared: payload.clear,
        },
    )))
}

/// Hand the buffer to the catalog for direct application
pub async fn emit_direct(
    State(state): State<SharedState>,
    payload: Option<Json<EmitDirectRequest>>,
) -> ApiResult<Json<SuccessResponse<EmitDirectResponse>>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();

    let mut router = state.router.lock().await;
    let count = router.buffered_proposals().len();
    let accepted = router.emitter().emit_direct(state.sink.as_ref()).await;
    let cleared = accepted && payload.clear;
    if cleared {
        router.emitter_mut().clear();
    }

    let message = if accepted { "Proposals accepted" } else { "Proposals rejected" };
    Ok(Json(SuccessResponse::with_data(
        message,
        EmitDirectResponse {
            accepted,
            count,
            cleared,
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::config::SyncConfig;
    use crate::entity::MemoryEntityStore;
    use crate::error::AppError;
    use crate::state::AppState;
    use std::path::Path;
    use std::sync::Arc;

    fn state(output_dir: &Path) -> SharedState {
        let catalog = Arc::new(InMemoryCatalog::new());
        Arc::new(AppState::new(
            Arc::new(MemoryEntityStore::new()),
            catalog.clone(),
            catalog,
            &SyncConfig {
                output_dir: Some(output_dir.to_path_buf()),
                ..Default::default()
            },
        ))
    }

    fn request(filename: &str, format: Option<&str>) -> EmitFileRequest {
        EmitFileRequest {
            filename: filename.to_string(),
            format: format.map(str::to_string),
            clear: false,
        }
    }

    #[tokio::test]
    async fn test_unknown_format_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = emit_to_file(State(state(dir.path())), Json(request("out.yaml", Some("yaml")))).await;

        match result {
            Err(AppError::Config(message)) => assert!(message.contains("yaml")),
            _ => panic!("expected a configuration error"),
        }
        assert!(!dir.path().join("out.yaml").exists());
    }

    #[tokio::test]
    async fn test_explicit_and_default_format() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        let Json(response) = emit_to_file(State(state.clone()), Json(request("out.jsonl", Some("JSONL"))))
            .await
            .unwrap();
        assert_eq!(response.data.unwrap().format, OutputFormat::Jsonl);

        let Json(response) = emit_to_file(State(state), Json(request("out.json", None))).await.unwrap();
        let data = response.data.unwrap();
        assert_eq!(data.format, OutputFormat::Json);
        assert!(data.path.exists());
    }
}
