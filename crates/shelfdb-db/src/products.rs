//! Database operations for the `products` table.
//!
//! One row per reconciled identity. The reconciler owns all merge semantics;
//! this module only maps [`CanonicalProduct`] to and from rows. The upsert
//! still applies `LEAST`/`GREATEST` to the observation bounds so that a run
//! executed without prior state cannot move `first_observed` forward or
//! `last_observed` backward.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use shelfdb_core::{CanonicalProduct, IdentityKey};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `products` table.
///
/// The list fields (`colors`, `sizes`, `fabrics`, `badges`, `images`) are
/// JSONB arrays of strings; [`ProductRow::into_canonical`] decodes them,
/// dropping any non-string elements written outside this crate.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub source_slug: String,
    pub product_code: String,
    pub name: Option<String>,
    pub url: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub gender: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub on_sale: bool,
    pub currency: Option<String>,
    pub colors: Value,
    pub sizes: Value,
    pub fabrics: Value,
    pub badges: Value,
    pub images: Value,
    pub best_seller: bool,
    pub best_seller_rank: Option<i32>,
    pub review_rating: Option<Decimal>,
    pub review_count: Option<i32>,
    pub homepage_featured: bool,
    pub first_observed: DateTime<Utc>,
    pub last_observed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
}

impl ProductRow {
    /// Converts the row back into the reconciler's canonical shape, for use
    /// as prior state in an incremental run.
    #[must_use]
    pub fn into_canonical(self) -> CanonicalProduct {
        CanonicalProduct {
            key: IdentityKey::new(self.source_slug, self.product_code),
            name: self.name,
            url: self.url,
            category: self.category,
            subcategory: self.subcategory,
            gender: self.gender,
            description: self.description,
            price: self.price,
            sale_price: self.sale_price,
            on_sale: self.on_sale,
            currency: self.currency,
            colors: decode_string_array(&self.colors),
            sizes: decode_string_array(&self.sizes),
            fabrics: decode_string_array(&self.fabrics),
            badges: decode_string_array(&self.badges),
            images: decode_string_array(&self.images),
            best_seller: self.best_seller,
            best_seller_rank: self.best_seller_rank.and_then(|r| u32::try_from(r).ok()),
            review_rating: self.review_rating,
            review_count: self.review_count.and_then(|c| u32::try_from(c).ok()),
            homepage_featured: self.homepage_featured,
            first_observed: self.first_observed,
            last_observed: self.last_observed,
        }
    }
}

fn decode_string_array(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

fn encode_string_array(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

const PRODUCT_COLUMNS: &str = "id, source_slug, product_code, name, url, category, subcategory, \
     gender, description, price, sale_price, on_sale, currency, \
     colors, sizes, fabrics, badges, images, \
     best_seller, best_seller_rank, review_rating, review_count, homepage_featured, \
     first_observed, last_observed, created_at, updated_at, retired_at";

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Returns all non-retired rows for one source, ordered by product code.
///
/// This is the prior state fed back into the reconciler on incremental runs.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products_for_source(
    pool: &PgPool,
    source_slug: &str,
) -> Result<Vec<ProductRow>, DbError> {
    let sql = format!(
        "SELECT {PRODUCT_COLUMNS} \
         FROM products \
         WHERE source_slug = $1 AND retired_at IS NULL \
         ORDER BY product_code",
    );
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(source_slug)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Upserts a batch of reconciled products inside one transaction.
///
/// Conflicts on `(source_slug, product_code)` replace every merged field in
/// place; `first_observed` takes the `LEAST` and `last_observed` the
/// `GREATEST` of the stored and incoming values. A re-observed product that
/// was previously retired is revived (`retired_at` cleared).
///
/// Returns the number of rows written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any upsert fails; the whole batch rolls back.
pub async fn upsert_products<'a, I>(pool: &PgPool, products: I) -> Result<usize, DbError>
where
    I: IntoIterator<Item = &'a CanonicalProduct>,
{
    let mut tx = pool.begin().await?;
    let mut count = 0usize;

    for product in products {
        sqlx::query(
            "INSERT INTO products \
                 (source_slug, product_code, name, url, category, subcategory, \
                  gender, description, price, sale_price, on_sale, currency, \
                  colors, sizes, fabrics, badges, images, \
                  best_seller, best_seller_rank, review_rating, review_count, \
                  homepage_featured, first_observed, last_observed) \
             VALUES ($1, $2, $3, $4, $5, $6, \
                     $7, $8, $9, $10, $11, $12, \
                     $13::jsonb, $14::jsonb, $15::jsonb, $16::jsonb, $17::jsonb, \
                     $18, $19, $20, $21, \
                     $22, $23, $24) \
             ON CONFLICT (source_slug, product_code) DO UPDATE SET \
                 name              = EXCLUDED.name, \
                 url               = EXCLUDED.url, \
                 category          = EXCLUDED.category, \
                 subcategory       = EXCLUDED.subcategory, \
                 gender            = EXCLUDED.gender, \
                 description       = EXCLUDED.description, \
                 price             = EXCLUDED.price, \
                 sale_price        = EXCLUDED.sale_price, \
                 on_sale           = EXCLUDED.on_sale, \
                 currency          = EXCLUDED.currency, \
                 colors            = EXCLUDED.colors, \
                 sizes             = EXCLUDED.sizes, \
                 fabrics           = EXCLUDED.fabrics, \
                 badges            = EXCLUDED.badges, \
                 images            = EXCLUDED.images, \
                 best_seller       = EXCLUDED.best_seller, \
                 best_seller_rank  = EXCLUDED.best_seller_rank, \
                 review_rating     = EXCLUDED.review_rating, \
                 review_count      = EXCLUDED.review_count, \
                 homepage_featured = EXCLUDED.homepage_featured, \
                 first_observed    = LEAST(products.first_observed, EXCLUDED.first_observed), \
                 last_observed     = GREATEST(products.last_observed, EXCLUDED.last_observed), \
                 retired_at        = NULL, \
                 updated_at        = NOW()",
        )
        .bind(&product.key.source)
        .bind(&product.key.code)
        .bind(&product.name)
        .bind(&product.url)
        .bind(&product.category)
        .bind(&product.subcategory)
        .bind(&product.gender)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.sale_price)
        .bind(product.on_sale)
        .bind(&product.currency)
        .bind(encode_string_array(&product.colors))
        .bind(encode_string_array(&product.sizes))
        .bind(encode_string_array(&product.fabrics))
        .bind(encode_string_array(&product.badges))
        .bind(encode_string_array(&product.images))
        .bind(product.best_seller)
        .bind(product.best_seller_rank.map(|r| i32::try_from(r).unwrap_or(i32::MAX)))
        .bind(product.review_rating)
        .bind(product.review_count.map(|c| i32::try_from(c).unwrap_or(i32::MAX)))
        .bind(product.homepage_featured)
        .bind(product.first_observed)
        .bind(product.last_observed)
        .execute(&mut *tx)
        .await?;

        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}

/// Soft-retires products not observed within the last `days` days.
///
/// A retired row keeps its history but drops out of prior state and
/// analytics. Returns the number of rows retired.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn retire_unseen_products(pool: &PgPool, days: i64) -> Result<u64, DbError> {
    let retired = sqlx::query(
        "UPDATE products \
         SET retired_at = NOW(), updated_at = NOW() \
         WHERE retired_at IS NULL \
           AND last_observed < NOW() - make_interval(days => $1::int)",
    )
    .bind(days)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(retired)
}
