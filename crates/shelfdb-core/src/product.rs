use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stable identity of a product: the site-local code scoped by source.
///
/// The code is the path segment following the site's product-path convention
/// (`/products/<code>` or `/p/<code>`), lowercased and trimmed. Scoping by
/// source guarantees that identically-coded products on different storefronts
/// never collide. Display names and full URLs are deliberately not part of
/// identity: names vary per color variant and URLs carry variant query
/// parameters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub source: String,
    pub code: String,
}

impl IdentityKey {
    #[must_use]
    pub fn new(source: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            code: code.into(),
        }
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.code)
    }
}

/// The reconciled, de-duplicated product entity persisted to the store.
///
/// Exactly one `CanonicalProduct` exists per [`IdentityKey`]; its fields are
/// the deterministic merge of every [`crate::RawRecord`] observed for that
/// key. Scalar price state reflects the most recent observation; the list
/// fields are unions that never shrink; `first_observed` is set once and
/// never moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProduct {
    pub key: IdentityKey,
    pub name: Option<String>,
    /// Canonical product URL with query string and fragment stripped.
    pub url: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub gender: Option<String>,
    pub description: Option<String>,
    /// Current list price, from the most recent observation.
    pub price: Option<Decimal>,
    /// Current sale price. `None` means not on sale right now — a newer
    /// observation without a sale price clears an older one.
    pub sale_price: Option<Decimal>,
    pub on_sale: bool,
    pub currency: Option<String>,
    /// Union of colors across all observations, first-seen casing,
    /// insertion order.
    pub colors: Vec<String>,
    pub sizes: Vec<String>,
    pub fabrics: Vec<String>,
    pub badges: Vec<String>,
    pub images: Vec<String>,
    /// Monotonic within a reconciliation run: once any observation marks the
    /// product a best seller it stays marked, since badges are
    /// under-observed rather than authoritative negatives.
    pub best_seller: bool,
    pub best_seller_rank: Option<u32>,
    pub review_rating: Option<Decimal>,
    pub review_count: Option<u32>,
    /// OR across observations within a run; cross-run decay is the store
    /// adapter's policy.
    pub homepage_featured: bool,
    /// Earliest observation timestamp ever merged; set once.
    pub first_observed: DateTime<Utc>,
    /// Latest observation timestamp merged so far.
    pub last_observed: DateTime<Utc>,
}

impl CanonicalProduct {
    /// Returns an empty product shell for a key first sighted at
    /// `observed_at`.
    #[must_use]
    pub fn first_sighting(key: IdentityKey, observed_at: DateTime<Utc>) -> Self {
        Self {
            key,
            name: None,
            url: None,
            category: None,
            subcategory: None,
            gender: None,
            description: None,
            price: None,
            sale_price: None,
            on_sale: false,
            currency: None,
            colors: Vec::new(),
            sizes: Vec::new(),
            fabrics: Vec::new(),
            badges: Vec::new(),
            images: Vec::new(),
            best_seller: false,
            best_seller_rank: None,
            review_rating: None,
            review_count: None,
            homepage_featured: false,
            first_observed: observed_at,
            last_observed: observed_at,
        }
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
    fn identity_key_display() {
        let key = IdentityKey::new("rivet", "banks-short-7in");
        assert_eq!(key.to_string(), "rivet:banks-short-7in");
    }

    #[test]
    fn identity_key_ordering_is_source_then_code() {
        let a = IdentityKey::new("alpha", "zzz");
        let b = IdentityKey::new("beta", "aaa");
        assert!(a < b);
    }

    #[test]
    fn first_sighting_pins_both_timestamps() {
        let product = CanonicalProduct::first_sighting(IdentityKey::new("rivet", "tee"), t0());
        assert_eq!(product.first_observed, t0());
        assert_eq!(product.last_observed, t0());
        assert!(!product.on_sale);
        assert!(product.colors.is_empty());
    }

    #[test]
    fn serde_roundtrip() {
        let mut product = CanonicalProduct::first_sighting(IdentityKey::new("rivet", "tee"), t0());
        product.name = Some("Strato Tech Tee".to_string());
        product.colors = vec!["Black".to_string(), "Navy".to_string()];
        let json = serde_json::to_string(&product).expect("serialization failed");
        let decoded: CanonicalProduct =
            serde_json::from_str(&json).expect("deserialization failed");
        assert_eq!(decoded, product);
    }
}
