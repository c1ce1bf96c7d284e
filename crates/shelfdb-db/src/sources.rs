//! Database operations for the `sources` table.

use chrono::{DateTime, Utc};
use shelfdb_core::SourceConfig;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `sources` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceRow {
    pub id: i64,
    pub public_id: Uuid,
    pub name: String,
    pub slug: String,
    /// `"primary"` or `"competitor"`.
    pub role: String,
    pub shop_url: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns all active, non-deleted sources, ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_sources(pool: &PgPool) -> Result<Vec<SourceRow>, DbError> {
    let rows = sqlx::query_as::<_, SourceRow>(
        "SELECT id, public_id, name, slug, role, shop_url, notes, is_active, \
                created_at, updated_at, deleted_at \
         FROM sources \
         WHERE is_active = true AND deleted_at IS NULL \
         ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns a single active, non-deleted source by slug, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_source_by_slug(pool: &PgPool, slug: &str) -> Result<Option<SourceRow>, DbError> {
    let row = sqlx::query_as::<_, SourceRow>(
        "SELECT id, public_id, name, slug, role, shop_url, notes, is_active, \
                created_at, updated_at, deleted_at \
         FROM sources \
         WHERE slug = $1 AND is_active = true AND deleted_at IS NULL",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Upsert sources from the YAML registry into the database.
///
/// Returns the number of sources processed (inserted or updated).
/// All upserts run inside a single transaction; if any operation fails
/// the entire batch is rolled back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_sources(pool: &PgPool, sources: &[SourceConfig]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;

    for source in sources {
        let slug = source.slug();
        let role = source.role.to_string();

        sqlx::query(
            "INSERT INTO sources (name, slug, role, shop_url, notes, is_active) \
             VALUES ($1, $2, $3, $4, $5, true) \
             ON CONFLICT (slug) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 role = EXCLUDED.role, \
                 shop_url = EXCLUDED.shop_url, \
                 notes = EXCLUDED.notes, \
                 updated_at = NOW()",
        )
        .bind(&source.name)
        .bind(&slug)
        .bind(&role)
        .bind(&source.shop_url)
        .bind(&source.notes)
        .execute(&mut *tx)
        .await?;

        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}
