//! Loader for browser-export JSON files.
//!
//! Catalog pages that resist automated fetching are scraped by hand from the
//! browser console; each session produces a JSON file holding an array of
//! loosely-shaped product objects (a single object also occurs). Files from
//! different sessions overlap heavily — the same product shows up once per
//! color variant and once per session — which is exactly what reconciliation
//! exists to collapse.

use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use shelfdb_core::RawRecord;

use crate::categorize::infer_category;
use crate::error::ExtractError;
use crate::source::{Harvest, ProductSource};

/// Matches the numeric part of a money string: `"$68.00"`, `"1,234.50"`,
/// `"USD 40"`.
static MONEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("money regex is valid"));

/// The tolerant wire shape of one exported product object.
///
/// Everything is optional and prices arrive as whatever the console snippet
/// captured — a number, `"$68.00"`, or null. Unknown keys are ignored.
#[derive(Debug, Deserialize)]
struct ExportRecord {
    product_id: Option<String>,
    url: Option<String>,
    name: Option<String>,
    gender: Option<String>,
    category: Option<String>,
    subcategory: Option<String>,
    description: Option<String>,
    price: Option<Value>,
    sale_price: Option<Value>,
    on_sale: Option<bool>,
    currency: Option<String>,
    #[serde(default)]
    colors: Vec<String>,
    #[serde(default)]
    sizes: Vec<String>,
    #[serde(default)]
    fabrics: Vec<String>,
    #[serde(default)]
    badges: Vec<String>,
    #[serde(default)]
    images: Vec<String>,
    is_best_seller: Option<bool>,
    best_seller_rank: Option<u32>,
    review_rating: Option<Value>,
    review_count: Option<u32>,
    homepage_featured: Option<bool>,
    scraped_at: Option<DateTime<Utc>>,
}

/// A [`ProductSource`] over one or more export files from the same
/// storefront.
#[derive(Debug)]
pub struct ExportFileSource {
    slug: String,
    paths: Vec<std::path::PathBuf>,
    /// Applied to records whose file predates the `scraped_at` convention.
    fallback_observed_at: DateTime<Utc>,
}

impl ExportFileSource {
    #[must_use]
    pub fn new(
        slug: impl Into<String>,
        paths: Vec<std::path::PathBuf>,
        fallback_observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            slug: slug.into(),
            paths,
            fallback_observed_at,
        }
    }
}

impl ProductSource for ExportFileSource {
    fn slug(&self) -> &str {
        &self.slug
    }

    async fn produce_candidates(&self) -> Result<Harvest, ExtractError> {
        load_export_files(&self.paths, &self.slug, self.fallback_observed_at)
    }
}

/// Loads several export files and concatenates their harvests.
///
/// # Errors
///
/// Returns [`ExtractError`] on the first unreadable or top-level-invalid
/// file. Malformed elements inside a readable file are counted, not fatal.
pub fn load_export_files(
    paths: &[std::path::PathBuf],
    source_slug: &str,
    fallback_observed_at: DateTime<Utc>,
) -> Result<Harvest, ExtractError> {
    let mut harvest = Harvest::default();
    for path in paths {
        harvest.absorb(load_export_file(path, source_slug, fallback_observed_at)?);
    }
    Ok(harvest)
}

/// Loads one export file.
///
/// Accepts either a JSON array of product objects or a single product
/// object. Elements that fail to deserialize are logged, counted as
/// malformed, and skipped.
///
/// # Errors
///
/// Returns [`ExtractError::Io`] if the file cannot be read,
/// [`ExtractError::Deserialize`] if it is not JSON at all, and
/// [`ExtractError::UnexpectedShape`] if the top level is neither an array
/// nor an object.
pub fn load_export_file(
    path: &Path,
    source_slug: &str,
    fallback_observed_at: DateTime<Utc>,
) -> Result<Harvest, ExtractError> {
    let content = std::fs::read_to_string(path).map_err(|e| ExtractError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let parsed: Value =
        serde_json::from_str(&content).map_err(|e| ExtractError::Deserialize {
            context: format!("export file {}", path.display()),
            source: e,
        })?;

    let elements = match parsed {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        _ => {
            return Err(ExtractError::UnexpectedShape {
                path: path.display().to_string(),
            })
        }
    };

    let mut harvest = Harvest::default();
    for element in elements {
        match serde_json::from_value::<ExportRecord>(element) {
            Ok(export) => {
                harvest
                    .records
                    .push(into_raw_record(export, source_slug, fallback_observed_at));
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping malformed export element");
                harvest.malformed += 1;
            }
        }
    }

    Ok(harvest)
}

fn into_raw_record(
    export: ExportRecord,
    source_slug: &str,
    fallback_observed_at: DateTime<Utc>,
) -> RawRecord {
    let mut record = RawRecord::new(
        source_slug,
        export.scraped_at.unwrap_or(fallback_observed_at),
    );

    record.product_code = export.product_id;
    record.name = export.name;
    record.gender = export.gender;
    record.subcategory = export.subcategory;
    record.description = export.description;
    record.price = export.price.as_ref().and_then(parse_money);
    record.sale_price = export.sale_price.as_ref().and_then(parse_money);
    record.on_sale = export.on_sale;
    record.currency = export.currency.or_else(|| Some("USD".to_string()));
    record.colors = export.colors;
    record.sizes = export.sizes;
    record.fabrics = export.fabrics;
    record.badges = export.badges;
    record.images = export.images;
    record.is_best_seller = export.is_best_seller;
    record.best_seller_rank = export.best_seller_rank;
    record.review_rating = export.review_rating.as_ref().and_then(parse_money);
    record.review_count = export.review_count;
    record.homepage_featured = export.homepage_featured;

    // Some console snippets emit the literal string "null" for a missing
    // category.
    let category = export
        .category
        .filter(|c| !c.trim().is_empty() && c != "null");
    record.category = category.or_else(|| {
        infer_category(export.url.as_deref(), record.name.as_deref())
            .map(str::to_string)
            .or_else(|| Some("Other".to_string()))
    });
    record.url = export.url;

    record
}

/// Parses a money-ish JSON value into a `Decimal`.
///
/// Numbers parse directly; strings are scanned for the first numeric run,
/// tolerating currency symbols and thousands separators. Anything else is
/// `None`.
fn parse_money(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        Value::String(s) => {
            let m = MONEY_RE.find(s)?;
            m.as_str().replace(',', "").parse::<Decimal>().ok()
        }
        _ => None,
    }
}
