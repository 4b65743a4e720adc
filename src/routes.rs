//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod entities;
mod modes;
mod operations;
mod proposals;
mod sync;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Routing modes
        .route("/api/modes", get(modes::get_modes).put(modes::update_modes))

        // Operations
        .route("/api/operations", post(operations::submit_operation))
        .route("/api/operations/queue", get(operations::list_queue))
        .route("/api/operations/flush", post(operations::flush_queue))

        // Change proposals
        .route("/api/proposals", get(proposals::list_proposals).delete(proposals::clear_proposals))
        .route("/api/proposals/emit", post(proposals::emit_to_file))
        .route("/api/proposals/emit-direct", post(proposals::emit_direct))

        // Local entities
        .route("/api/entities", get(entities::list_entities).post(entities::upsert_entity))
        .route("/api/entities/{urn}", get(entities::get_entity).delete(entities::delete_entity))

        // Sync
        .route("/api/sync/pull", post(sync::pull))
        .route("/api/sync/import", post(sync::import))
        .route("/api/sync/push", post(sync::push))
        .route("/api/sync/status", get(sync::status_summary))

        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    }
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "service": env!("CARGO_PKG_NAME"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
