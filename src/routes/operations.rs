//! Operation submission handlers

use crate::error::ApiResult;
use crate::models::{BatchResponse, SuccessResponse};
use crate::pipeline::{OperationDescriptor, OperationResult};
use crate::state::SharedState;
use axum::extract::State;
use axum::Json;

/// Submit one operation; queued or executed depending on the batch mode
pub async fn submit_operation(
    State(state): State<SharedState>,
    Json(descriptor): Json<OperationDescriptor>,
) -> ApiResult<Json<OperationResult>> {
    let mut router = state.router.lock().await;
    Ok(Json(router.submit(descriptor).await))
}

/// Operations waiting for the next flush
pub async fn list_queue(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<Vec<OperationDescriptor>>>> {
    let router = state.router.lock().await;
    let queue = router.pending_operations().to_vec();
    Ok(Json(SuccessResponse::with_data(
        format!("{} operations queued", queue.len()),
        queue,
    )))
}

/// Execute the queue in submission order
pub async fn flush_queue(State(state): State<SharedState>) -> ApiResult<Json<SuccessResponse<BatchResponse>>> {
    let mut router = state.router.lock().await;
    let batch = router.flush_batch().await;
    Ok(Json(SuccessResponse::with_data("Batch flushed", BatchResponse::from(batch))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::config::SyncConfig;
    use crate::entity::MemoryEntityStore;
    use crate::state::AppState;
    use serde_json::json;
    use std::sync::Arc;

    fn state(batch_mode: bool) -> SharedState {
        let catalog = Arc::new(InMemoryCatalog::new());
        Arc::new(AppState::new(
            Arc::new(MemoryEntityStore::new()),
            catalog.clone(),
            catalog,
            &SyncConfig {
                batch_mode,
                ..Default::default()
            },
        ))
    }

    fn create_tag(id: &str) -> OperationDescriptor {
        serde_json::from_value(json!({
            "operation": "create",
            "kind": "tag",
            "input": { "id": id, "name": id }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_then_flush() {
        let state = state(true);

        for id in ["a", "b", "c"] {
            let Json(result) = submit_operation(State(state.clone()), Json(create_tag(id))).await.unwrap();
            assert!(result.queued);
        }

        let Json(queue) = list_queue(State(state.clone())).await.unwrap();
        assert_eq!(queue.data.unwrap().len(), 3);

        let Json(flushed) = flush_queue(State(state.clone())).await.unwrap();
        let batch = flushed.data.unwrap();
        assert_eq!(batch.summary.total_operations, 3);
        assert_eq!(batch.summary.total_proposals, 3);
        assert_eq!(state.router.lock().await.buffered_proposals().len(), 3);
    }
}
