//! Database connection management
//!
//! Builds the connection pool for the PostgreSQL entity store.

use crate::config::DatabaseConfig;
use crate::error::AppError;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Create a pool from settings, with TLS when the server requires it
pub fn create_pool(config: &DatabaseConfig) -> Result<Pool, AppError> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.max_pool_size));

    let pool = if config.require_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

        cfg.create_pool(Some(Runtime::Tokio1), tls)
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
    }
    .map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))?;

    debug!(
        "Created pool for {}:{}/{} (max {} connections, TLS: {})",
        config.host, config.port, config.database, config.max_pool_size, config.require_tls
    );
    Ok(pool)
}

/// Check that the pool can reach the server
pub async fn verify(pool: &Pool) -> Result<(), AppError> {
    let client = pool.get().await?;
    client.query_one("SELECT 1", &[]).await?;
    info!("Database connection successful");
    Ok(())
}
