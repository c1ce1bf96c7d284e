//! Extractor for Shopify storefronts via the public `products.json` endpoint.
//!
//! Competitor catalogs on Shopify expose their full product list as paged
//! JSON; no DOM scraping needed. Handles rate limiting (429), not-found
//! (404), and other non-2xx responses as typed errors. Pagination is the
//! plain `page=N` parameter, which every storefront in scope serves.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use shelfdb_core::RawRecord;

use crate::error::ExtractError;
use crate::source::{Harvest, ProductSource};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ShopifyProduct {
    title: Option<String>,
    handle: String,
    product_type: Option<String>,
    #[serde(default)]
    variants: Vec<ShopifyVariant>,
    #[serde(default)]
    options: Vec<ShopifyOption>,
    #[serde(default)]
    images: Vec<ShopifyImage>,
}

#[derive(Debug, Deserialize)]
struct ShopifyVariant {
    price: Option<String>,
    compare_at_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShopifyOption {
    name: String,
    #[serde(default)]
    values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ShopifyImage {
    src: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for paged `products.json` fetches.
pub struct StorefrontClient {
    client: Client,
    inter_request_delay_ms: u64,
    max_pages: usize,
}

impl StorefrontClient {
    /// Creates a client with the configured timeout and `User-Agent`.
    ///
    /// `inter_request_delay_ms` is the pause between page requests; a small
    /// random jitter is added so repeated runs do not hit the storefront on a
    /// fixed cadence.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        inter_request_delay_ms: u64,
        max_pages: usize,
    ) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            inter_request_delay_ms,
            max_pages,
        })
    }

    /// Fetches the full catalog, iterating `page=1..` until a page comes back
    /// empty.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::RateLimited`] — HTTP 429.
    /// - [`ExtractError::NotFound`] — HTTP 404 (store has no public endpoint).
    /// - [`ExtractError::UnexpectedStatus`] — any other non-2xx status.
    /// - [`ExtractError::PageLimit`] — catalog exceeded `max_pages`.
    /// - [`ExtractError::Http`] / [`ExtractError::Deserialize`] — transport or
    ///   body failures.
    ///
    /// On any page failure the partial catalog is discarded: a truncated
    /// snapshot would masquerade as a wave of retired products downstream.
    pub async fn fetch_all_products(
        &self,
        shop_url: &str,
    ) -> Result<Vec<serde_json::Value>, ExtractError> {
        let origin = store_origin(shop_url)?;
        let mut all: Vec<serde_json::Value> = Vec::new();
        let mut page = 1usize;

        loop {
            if page > self.max_pages {
                return Err(ExtractError::PageLimit {
                    shop_url: shop_url.to_owned(),
                    max_pages: self.max_pages,
                });
            }

            if page > 1 && self.inter_request_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.jittered_delay_ms())).await;
            }

            let url = format!("{origin}/products.json?limit=250&page={page}");
            let batch = self.fetch_page(&url, shop_url).await?;
            if batch.is_empty() {
                break;
            }
            all.extend(batch);
            page += 1;
        }

        Ok(all)
    }

    async fn fetch_page(
        &self,
        url: &str,
        shop_url: &str,
    ) -> Result<Vec<serde_json::Value>, ExtractError> {
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "application/json,text/html;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ExtractError::RateLimited {
                domain: domain_of(shop_url),
                retry_after_secs,
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ExtractError::NotFound {
                url: url.to_owned(),
            });
        }

        if !status.is_success() {
            return Err(ExtractError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let body = response.text().await?;
        let parsed: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| ExtractError::Deserialize {
                context: format!("products page from {shop_url}"),
                source: e,
            })?;

        // Keep elements as raw values here: per-product mapping failures are
        // counted by the source, not fatal to the page.
        Ok(parsed
            .get("products")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    fn jittered_delay_ms(&self) -> u64 {
        let base = self.inter_request_delay_ms;
        let jitter_cap = (base / 4).max(1);
        base + rand::rng().random_range(0..jitter_cap)
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A [`ProductSource`] over one Shopify storefront.
pub struct ShopifySource {
    client: StorefrontClient,
    slug: String,
    shop_url: String,
}

impl ShopifySource {
    #[must_use]
    pub fn new(client: StorefrontClient, slug: impl Into<String>, shop_url: impl Into<String>) -> Self {
        Self {
            client,
            slug: slug.into(),
            shop_url: shop_url.into(),
        }
    }
}

impl ProductSource for ShopifySource {
    fn slug(&self) -> &str {
        &self.slug
    }

    async fn produce_candidates(&self) -> Result<Harvest, ExtractError> {
        let raw_products = self.client.fetch_all_products(&self.shop_url).await?;
        let origin = store_origin(&self.shop_url)?;
        let observed_at = Utc::now();

        let mut harvest = Harvest::default();
        for value in raw_products {
            match serde_json::from_value::<ShopifyProduct>(value) {
                Ok(product) => {
                    harvest
                        .records
                        .push(into_raw_record(product, &self.slug, &origin, observed_at));
                }
                Err(e) => {
                    tracing::warn!(slug = %self.slug, error = %e, "skipping malformed storefront product");
                    harvest.malformed += 1;
                }
            }
        }
        Ok(harvest)
    }
}

fn into_raw_record(
    product: ShopifyProduct,
    slug: &str,
    origin: &str,
    observed_at: chrono::DateTime<Utc>,
) -> RawRecord {
    let mut record = RawRecord::new(slug, observed_at);

    record.url = Some(format!("{origin}/products/{}", product.handle));
    record.product_code = Some(product.handle);
    record.name = product.title;
    record.category = product.product_type.filter(|t| !t.is_empty());
    record.currency = Some("USD".to_string());

    // The first variant's pricing stands for the product. Shopify reports the
    // live (possibly discounted) price in `price` and the original in
    // `compare_at_price`.
    if let Some(variant) = product.variants.first() {
        let live = variant.price.as_deref().and_then(parse_decimal);
        let compare = variant.compare_at_price.as_deref().and_then(parse_decimal);
        match (live, compare) {
            (Some(live), Some(compare)) if compare > live => {
                record.price = Some(compare);
                record.sale_price = Some(live);
                record.on_sale = Some(true);
            }
            (live, _) => {
                record.price = live;
                record.on_sale = Some(false);
            }
        }
    }

    for option in product.options {
        let name = option.name.to_lowercase();
        if name == "color" || name == "colour" {
            record.colors = option.values;
        } else if name == "size" {
            record.sizes = option.values;
        }
    }

    record.images = product.images.into_iter().map(|i| i.src).collect();

    record
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    s.parse::<Decimal>().ok()
}

/// Normalizes a configured shop URL into a `scheme://host[:port]` origin,
/// defaulting to `https` when no scheme is given.
fn store_origin(shop_url: &str) -> Result<String, ExtractError> {
    let trimmed = shop_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ExtractError::InvalidShopUrl {
            shop_url: shop_url.to_owned(),
            reason: "empty".to_string(),
        });
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url =
        reqwest::Url::parse(&with_scheme).map_err(|e| ExtractError::InvalidShopUrl {
            shop_url: shop_url.to_owned(),
            reason: e.to_string(),
        })?;
    let host = url.host_str().ok_or_else(|| ExtractError::InvalidShopUrl {
        shop_url: shop_url.to_owned(),
        reason: "no host".to_string(),
    })?;
    // `port()` is None for the scheme default, so that never leaks into the
    // origin; an explicit non-default port must survive.
    match url.port() {
        Some(port) => Ok(format!("{}://{host}:{port}", url.scheme())),
        None => Ok(format!("{}://{host}", url.scheme())),
    }
}

fn domain_of(shop_url: &str) -> String {
    store_origin(shop_url)
        .ok()
        .and_then(|o| o.split("://").nth(1).map(str::to_owned))
        .unwrap_or_else(|| shop_url.to_owned())
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn sample_product_json(handle: &str, price: &str, compare_at: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "id": 42,
            "title": "Strato Tech Tee",
            "handle": handle,
            "product_type": "Tops",
            "variants": [{
                "id": 1,
                "price": price,
                "compare_at_price": compare_at,
            }],
            "options": [
                {"name": "Color", "values": ["Black", "Navy"]},
                {"name": "Size", "values": ["S", "M", "L"]},
            ],
            "images": [{"src": "https://cdn.example/tee.jpg"}],
        })
    }

    fn test_client() -> StorefrontClient {
        StorefrontClient::new(5, "shelfdb-test/0.1", 0, 10).unwrap()
    }

    #[test]
    fn store_origin_normalizes_bare_domains() {
        assert_eq!(
            store_origin("summit.example").unwrap(),
            "https://summit.example"
        );
        assert_eq!(
            store_origin("https://summit.example/").unwrap(),
            "https://summit.example"
        );
        assert!(store_origin("  ").is_err());
    }

    #[test]
    fn store_origin_keeps_explicit_ports() {
        assert_eq!(
            store_origin("http://127.0.0.1:8080/").unwrap(),
            "http://127.0.0.1:8080"
        );
        // Scheme-default ports stay out of the origin.
        assert_eq!(
            store_origin("https://summit.example:443").unwrap(),
            "https://summit.example"
        );
    }

    #[test]
    fn mapping_reads_sale_pricing_from_compare_at() {
        let product: ShopifyProduct =
            serde_json::from_value(sample_product_json("tee", "32.00", Some("40.00"))).unwrap();
        let record = into_raw_record(product, "summit", "https://summit.example", Utc::now());

        assert_eq!(record.price, Some(Decimal::new(4000, 2)));
        assert_eq!(record.sale_price, Some(Decimal::new(3200, 2)));
        assert_eq!(record.on_sale, Some(true));
        assert_eq!(record.colors, vec!["Black", "Navy"]);
        assert_eq!(record.sizes, vec!["S", "M", "L"]);
        assert_eq!(
            record.url.as_deref(),
            Some("https://summit.example/products/tee")
        );
        assert_eq!(record.product_code.as_deref(), Some("tee"));
    }

    #[test]
    fn mapping_without_compare_at_is_not_on_sale() {
        let product: ShopifyProduct =
            serde_json::from_value(sample_product_json("tee", "40.00", None)).unwrap();
        let record = into_raw_record(product, "summit", "https://summit.example", Utc::now());

        assert_eq!(record.price, Some(Decimal::new(4000, 2)));
        assert_eq!(record.sale_price, None);
        assert_eq!(record.on_sale, Some(false));
    }

    #[tokio::test]
    async fn fetch_all_products_walks_pages_until_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/products.json"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "products": [sample_product_json("tee", "40.00", None)]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/products.json"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"products": []})),
            )
            .mount(&server)
            .await;

        let products = test_client().fetch_all_products(&server.uri()).await.unwrap();
        assert_eq!(products.len(), 1);
    }

    #[tokio::test]
    async fn not_found_is_a_typed_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = test_client()
            .fetch_all_products(&server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rate_limit_reports_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products.json"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = test_client()
            .fetch_all_products(&server.uri())
            .await
            .unwrap_err();
        assert!(
            matches!(err, ExtractError::RateLimited { retry_after_secs: 7, .. }),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn produce_candidates_counts_malformed_products() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products.json"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "products": [sample_product_json("tee", "40.00", None), {"no_handle": true}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/products.json"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"products": []})),
            )
            .mount(&server)
            .await;

        let source = ShopifySource::new(test_client(), "summit", server.uri());
        let harvest = source.produce_candidates().await.unwrap();
        assert_eq!(harvest.records.len(), 1);
        assert_eq!(harvest.malformed, 1);
    }
}
