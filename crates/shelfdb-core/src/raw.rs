use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One observation of a product from a single extraction pass.
///
/// A `RawRecord` is immutable once produced. Many records may describe the
/// same logical product: one per color variant on a listing page, or repeated
/// observations across scrape sessions. Reconciliation collapses them into a
/// single [`crate::CanonicalProduct`] keyed by `(source, product code)`.
///
/// Every field except `source` and `observed_at` is optional — extractors are
/// best-effort and routinely miss fields per page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Slug of the source this record was extracted from (e.g. `"rivet"`).
    pub source: String,
    /// Product page URL as observed, possibly with variant query parameters.
    pub url: Option<String>,
    /// Site-local product code, when the extractor provides one directly.
    /// When absent the code is extracted from `url` during identity
    /// resolution.
    pub product_code: Option<String>,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub description: Option<String>,
    /// List price at observation time.
    pub price: Option<Decimal>,
    /// Discounted price; `None` means no sale was observed.
    pub sale_price: Option<Decimal>,
    /// Explicit on-sale marker when the page exposes one. When absent,
    /// `sale_price.is_some()` is used as the signal.
    pub on_sale: Option<bool>,
    /// ISO 4217 currency code (e.g. `"USD"`).
    pub currency: Option<String>,
    /// Color names observed on this pass, typically one per variant swatch.
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub fabrics: Vec<String>,
    /// Marketing badges as shown on the listing card (e.g. `"Best Seller"`,
    /// `"New"`).
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    /// Best-seller marker, when the extractor resolved the badge itself.
    pub is_best_seller: Option<bool>,
    /// Position within a best-sellers module, 1-based, when observed.
    pub best_seller_rank: Option<u32>,
    pub review_rating: Option<Decimal>,
    pub review_count: Option<u32>,
    /// Whether the product appeared on the storefront homepage this pass.
    pub homepage_featured: Option<bool>,
    /// When this observation was captured.
    pub observed_at: DateTime<Utc>,
}

impl RawRecord {
    /// Returns a record with only identity fields and a timestamp set.
    ///
    /// Intended as a starting point for extractors, which then fill in
    /// whatever the page exposes.
    #[must_use]
    pub fn new(source: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            url: None,
            product_code: None,
            name: None,
            gender: None,
            category: None,
            subcategory: None,
            description: None,
            price: None,
            sale_price: None,
            on_sale: None,
            currency: None,
            colors: Vec::new(),
            sizes: Vec::new(),
            fabrics: Vec::new(),
            badges: Vec::new(),
            images: Vec::new(),
            is_best_seller: None,
            best_seller_rank: None,
            review_rating: None,
            review_count: None,
            homepage_featured: None,
            observed_at,
        }
    }

    /// Returns `true` if the record carries neither a URL nor an explicit
    /// product code, i.e. identity resolution cannot possibly succeed.
    #[must_use]
    pub fn lacks_identity_hint(&self) -> bool {
        self.product_code.as_deref().is_none_or(str::is_empty)
            && self.url.as_deref().is_none_or(str::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn new_record_has_only_identity_fields() {
        let record = RawRecord::new("rivet", t0());
        assert_eq!(record.source, "rivet");
        assert_eq!(record.observed_at, t0());
        assert!(record.name.is_none());
        assert!(record.colors.is_empty());
    }

    #[test]
    fn lacks_identity_hint_when_both_absent() {
        let record = RawRecord::new("rivet", t0());
        assert!(record.lacks_identity_hint());
    }

    #[test]
    fn lacks_identity_hint_false_with_url() {
        let mut record = RawRecord::new("rivet", t0());
        record.url = Some("https://example.com/products/tee".to_string());
        assert!(!record.lacks_identity_hint());
    }

    #[test]
    fn lacks_identity_hint_false_with_code() {
        let mut record = RawRecord::new("rivet", t0());
        record.product_code = Some("tee".to_string());
        assert!(!record.lacks_identity_hint());
    }

    #[test]
    fn lacks_identity_hint_true_with_empty_strings() {
        let mut record = RawRecord::new("rivet", t0());
        record.url = Some(String::new());
        record.product_code = Some(String::new());
        assert!(record.lacks_identity_hint());
    }

    #[test]
    fn serde_missing_list_fields_default_to_empty() {
        let json = r#"{"source":"rivet","observed_at":"2026-03-01T12:00:00Z"}"#;
        let record: RawRecord = serde_json::from_str(json).expect("deserialization failed");
        assert!(record.colors.is_empty());
        assert!(record.sizes.is_empty());
        assert!(record.fabrics.is_empty());
        assert!(record.badges.is_empty());
        assert!(record.images.is_empty());
    }

    #[test]
    fn serde_roundtrip_preserves_price() {
        let mut record = RawRecord::new("rivet", t0());
        record.price = Some(Decimal::new(6800, 2));
        let json = serde_json::to_string(&record).expect("serialization failed");
        let decoded: RawRecord = serde_json::from_str(&json).expect("deserialization failed");
        assert_eq!(decoded.price, Some(Decimal::new(6800, 2)));
    }
}
