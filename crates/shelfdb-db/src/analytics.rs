//! Read-model queries behind the `report` command.
//!
//! All aggregates run over non-retired `products` rows and use the effective
//! price (sale price while on sale, list price otherwise) so that discounted
//! catalogs compare honestly against full-price ones.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// Aggregated pricing metrics per source.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PricingSummaryRow {
    pub source_slug: String,
    pub role: String,
    pub product_count: i64,
    pub avg_price: Option<Decimal>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub on_sale_count: i64,
    pub latest_observed: Option<DateTime<Utc>>,
}

/// Product counts and average price per `(source, category)` pair.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryBreakdownRow {
    pub source_slug: String,
    pub category: String,
    pub product_count: i64,
    pub avg_price: Option<Decimal>,
}

/// A product flagged as a best seller, with its rank where known.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BestSellerRow {
    pub source_slug: String,
    pub product_code: String,
    pub name: Option<String>,
    pub best_seller_rank: Option<i32>,
    pub price: Option<Decimal>,
}

/// Returns per-source pricing metrics, primary source first then by slug.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn pricing_summary(pool: &PgPool) -> Result<Vec<PricingSummaryRow>, DbError> {
    let rows = sqlx::query_as::<_, PricingSummaryRow>(
        "SELECT \
             p.source_slug, \
             COALESCE(s.role, 'competitor') AS role, \
             COUNT(*) AS product_count, \
             AVG(CASE WHEN p.on_sale THEN COALESCE(p.sale_price, p.price) ELSE p.price END) \
                 AS avg_price, \
             MIN(CASE WHEN p.on_sale THEN COALESCE(p.sale_price, p.price) ELSE p.price END) \
                 AS min_price, \
             MAX(CASE WHEN p.on_sale THEN COALESCE(p.sale_price, p.price) ELSE p.price END) \
                 AS max_price, \
             COUNT(*) FILTER (WHERE p.on_sale) AS on_sale_count, \
             MAX(p.last_observed) AS latest_observed \
         FROM products p \
         LEFT JOIN sources s ON s.slug = p.source_slug AND s.deleted_at IS NULL \
         WHERE p.retired_at IS NULL \
         GROUP BY p.source_slug, s.role \
         ORDER BY COALESCE(s.role, 'competitor') = 'primary' DESC, p.source_slug",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns product counts and average effective price per source and
/// category, largest buckets first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn category_breakdown(pool: &PgPool) -> Result<Vec<CategoryBreakdownRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryBreakdownRow>(
        "SELECT \
             source_slug, \
             COALESCE(category, 'Other') AS category, \
             COUNT(*) AS product_count, \
             AVG(CASE WHEN on_sale THEN COALESCE(sale_price, price) ELSE price END) \
                 AS avg_price \
         FROM products \
         WHERE retired_at IS NULL \
         GROUP BY source_slug, COALESCE(category, 'Other') \
         ORDER BY product_count DESC, source_slug, category",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns best-seller products, ranked ones first, capped at `limit`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_best_sellers(pool: &PgPool, limit: i64) -> Result<Vec<BestSellerRow>, DbError> {
    let rows = sqlx::query_as::<_, BestSellerRow>(
        "SELECT source_slug, product_code, name, best_seller_rank, price \
         FROM products \
         WHERE best_seller = true AND retired_at IS NULL \
         ORDER BY best_seller_rank ASC NULLS LAST, source_slug, product_code \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
