//! Postgres store adapter: pool setup, embedded migrations, and the table
//! modules. Merge semantics live upstream in the reconciler; everything here
//! is persistence and read models.

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

// Path relative to crates/shelfdb-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Connection-pool sizing, carried over from [`shelfdb_core::AppConfig`].
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl PoolConfig {
    /// Pool sizing from the already-loaded application config. The config
    /// loader owns env parsing and defaults; nothing here re-reads the
    /// environment.
    #[must_use]
    pub fn from_app_config(config: &shelfdb_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("ingest run {id} is not in status '{expected_status}'")]
    InvalidIngestRunTransition {
        id: i64,
        expected_status: &'static str,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}


pub mod analytics;
pub mod ingest_runs;
pub mod products;
pub mod sources;

pub use analytics::{
    category_breakdown, list_best_sellers, pricing_summary, BestSellerRow, CategoryBreakdownRow,
    PricingSummaryRow,
};
pub use ingest_runs::{
    complete_ingest_run, create_ingest_run, fail_ingest_run, list_ingest_runs, start_ingest_run,
    upsert_ingest_run_source, IngestRunRow, IngestRunSourceRow,
};
pub use products::{
    list_products_for_source, retire_unseen_products, upsert_products, ProductRow,
};
pub use sources::{get_source_by_slug, list_active_sources, seed_sources, SourceRow};
