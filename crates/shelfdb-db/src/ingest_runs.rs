//! Database operations for `ingest_runs` and `ingest_run_sources`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `ingest_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngestRunRow {
    pub id: i64,
    pub public_id: Uuid,
    /// `"export"` or `"storefront"`.
    pub run_type: String,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_in: i32,
    pub unique_identities: i32,
    pub unidentifiable: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `ingest_run_sources` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngestRunSourceRow {
    pub id: i64,
    pub ingest_run_id: i64,
    pub source_slug: String,
    pub status: String,
    pub records_in: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ingest_runs operations
// ---------------------------------------------------------------------------

/// Creates a new ingest run in `queued` status.
///
/// Generates a UUID in Rust and binds it to `public_id`. Returns the full
/// newly-created row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert or fetch fails.
pub async fn create_ingest_run(
    pool: &PgPool,
    run_type: &str,
    trigger_source: &str,
) -> Result<IngestRunRow, DbError> {
    let public_id = Uuid::new_v4();

    let row = sqlx::query_as::<_, IngestRunRow>(
        "INSERT INTO ingest_runs (public_id, run_type, trigger_source, status) \
         VALUES ($1, $2, $3, 'queued') \
         RETURNING id, public_id, run_type, trigger_source, status, \
                   started_at, completed_at, records_in, unique_identities, \
                   unidentifiable, error_message, created_at",
    )
    .bind(public_id)
    .bind(run_type)
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidIngestRunTransition`] if the run is not in
/// `queued` status, or [`DbError::Sqlx`] if the update fails.
pub async fn start_ingest_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE ingest_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidIngestRunTransition {
            id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Marks a run as `succeeded` and records the reconciliation totals.
///
/// # Errors
///
/// Returns [`DbError::InvalidIngestRunTransition`] if the run is not in
/// `running` status, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_ingest_run(
    pool: &PgPool,
    id: i64,
    records_in: i32,
    unique_identities: i32,
    unidentifiable: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE ingest_runs \
         SET status = 'succeeded', completed_at = NOW(), \
             records_in = $1, unique_identities = $2, unidentifiable = $3 \
         WHERE id = $4 AND status = 'running'",
    )
    .bind(records_in)
    .bind(unique_identities)
    .bind(unidentifiable)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidIngestRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed`, sets `completed_at = NOW()` and `error_message`.
///
/// # Errors
///
/// Returns [`DbError::InvalidIngestRunTransition`] if the run is not in
/// `running` status, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_ingest_run(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE ingest_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidIngestRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Returns the most recent `limit` runs, ordered by `created_at DESC`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_ingest_runs(pool: &PgPool, limit: i64) -> Result<Vec<IngestRunRow>, DbError> {
    let rows = sqlx::query_as::<_, IngestRunRow>(
        "SELECT id, public_id, run_type, trigger_source, status, \
                started_at, completed_at, records_in, unique_identities, \
                unidentifiable, error_message, created_at \
         FROM ingest_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// ingest_run_sources operations
// ---------------------------------------------------------------------------

/// Inserts or updates the per-source result row for an ingest run.
///
/// Conflicts on `(ingest_run_id, source_slug)` update `status`, `records_in`,
/// and `error_message` in place.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_ingest_run_source(
    pool: &PgPool,
    run_id: i64,
    source_slug: &str,
    status: &str,
    records_in: Option<i32>,
    error_message: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO ingest_run_sources \
             (ingest_run_id, source_slug, status, records_in, error_message) \
         VALUES ($1, $2, $3, COALESCE($4, 0), $5) \
         ON CONFLICT (ingest_run_id, source_slug) DO UPDATE SET \
             status        = EXCLUDED.status, \
             records_in    = EXCLUDED.records_in, \
             error_message = EXCLUDED.error_message",
    )
    .bind(run_id)
    .bind(source_slug)
    .bind(status)
    .bind(records_in)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}
