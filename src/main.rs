//! Metasync API - Metadata Catalog Sync
//!
//! Mirrors metadata entities (tags, domains, glossary, data products,
//! contracts, assertions, tests, structured properties) between a local
//! store and a remote catalog, tracks drift per entity, and pushes changes
//! either as direct mutations or as staged change proposals.

mod catalog;
mod config;
mod db;
mod entity;
mod error;
mod models;
mod pipeline;
mod proposal;
mod routes;
mod state;
mod sync;

use crate::catalog::InMemoryCatalog;
use crate::config::Settings;
use crate::entity::{EntityStore, MemoryEntityStore, PgEntityStore};
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting metasync...");

    let settings = Settings::load()?;
    info!("Configuration loaded successfully");

    let store: Arc<dyn EntityStore> = match &settings.database {
        Some(database) => {
            let pool = db::create_pool(database)?;
            db::verify(&pool).await?;
            let store = PgEntityStore::new(pool);
            store.ensure_schema().await?;
            info!("Using PostgreSQL entity store at {}:{}", database.host, database.port);
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, entities are kept in memory");
            Arc::new(MemoryEntityStore::new())
        }
    };

    // Loopback catalog: receives both direct mutations and emitted proposals
    let catalog = Arc::new(InMemoryCatalog::new());
    let state = Arc::new(AppState::new(store, catalog.clone(), catalog, &settings.sync));

    {
        let router = state.router.lock().await;
        let modes = router.config();
        info!(
            "Modes: sync={} batch={} emit_to_file={} output_dir={:?} format={}",
            modes.sync_mode, modes.batch_mode, modes.emit_to_file, modes.output_dir, state.proposal_format
        );
    }

    let app = create_router(state, &settings);
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("Server listening on http://{}", addr);
    info!("API Endpoints:");
    info!("   GET|PUT /api/modes              - Read / change routing modes");
    info!("   POST    /api/operations         - Submit an operation");
    info!("   GET     /api/operations/queue   - Queued operations");
    info!("   POST    /api/operations/flush   - Execute the batch queue");
    info!("   GET     /api/proposals          - Buffered change proposals");
    info!("   POST    /api/proposals/emit     - Write proposals to a file");
    info!("   POST    /api/sync/pull          - Pull and reconcile");
    info!("   POST    /api/sync/push          - Push a local entity");
    info!("   GET     /api/sync/status        - Status summary");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,metasync=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
