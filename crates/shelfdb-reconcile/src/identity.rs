//! Identity resolution: from a raw observation to its `(source, code)` key.

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use shelfdb_core::{IdentityKey, RawRecord, SourcesFile};

use crate::error::IdentityError;

const DEFAULT_PREFIXES: [&str; 2] = ["/products/", "/p/"];

/// Per-source URL conventions used to extract product codes.
///
/// Each source maps to the list of path prefixes that precede the product
/// code on that site. Sources not present in the map fall back to the common
/// `/products/` and `/p/` conventions.
#[derive(Debug, Clone)]
pub struct IdentityRules {
    prefixes_by_source: BTreeMap<String, Vec<String>>,
}

impl IdentityRules {
    /// Rules using only the default `/products/` and `/p/` conventions for
    /// every source.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            prefixes_by_source: BTreeMap::new(),
        }
    }

    /// Builds rules from the source registry, keyed by source slug.
    #[must_use]
    pub fn from_sources(sources: &SourcesFile) -> Self {
        let prefixes_by_source = sources
            .sources
            .iter()
            .map(|s| (s.slug(), s.product_path_prefixes.clone()))
            .collect();
        Self { prefixes_by_source }
    }

    fn prefixes_for(&self, source: &str) -> &[String] {
        self.prefixes_by_source
            .get(source)
            .map_or(&[], Vec::as_slice)
    }
}

/// Computes the identity key for a raw record.
///
/// An explicit `product_code` on the record wins; otherwise the code is the
/// path segment following the first matching product-path prefix in the URL,
/// after stripping the query string and fragment. The code is
/// percent-decoded, trimmed, and lowercased, and the key is scoped by the
/// record's source.
///
/// # Errors
///
/// Returns [`IdentityError`] when no code can be extracted. Callers treat
/// this as "unidentifiable" and drop the record from reconciliation — it must
/// never merge into an unrelated entity.
pub fn resolve_identity(
    rules: &IdentityRules,
    record: &RawRecord,
) -> Result<IdentityKey, IdentityError> {
    if record.lacks_identity_hint() {
        return Err(IdentityError::MissingHint {
            source_slug: record.source.clone(),
        });
    }

    if let Some(code) = record.product_code.as_deref() {
        if !code.trim().is_empty() {
            let normalized = normalize_code(code);
            if normalized.is_empty() {
                return Err(IdentityError::EmptyCode {
                    origin: code.to_string(),
                });
            }
            return Ok(IdentityKey::new(record.source.clone(), normalized));
        }
    }

    let Some(url) = record.url.as_deref().filter(|u| !u.trim().is_empty()) else {
        return Err(IdentityError::MissingHint {
            source_slug: record.source.clone(),
        });
    };

    let path = url_path(url);
    let code = extract_code(path, rules.prefixes_for(&record.source)).ok_or_else(|| {
        IdentityError::NoCodeInUrl {
            url: url.to_string(),
        }
    })?;

    let normalized = normalize_code(code);
    if normalized.is_empty() {
        return Err(IdentityError::EmptyCode {
            origin: url.to_string(),
        });
    }

    Ok(IdentityKey::new(record.source.clone(), normalized))
}

/// Strips variant query parameters and the fragment from a product URL.
///
/// This is the canonical form persisted on the merged product; two URLs that
/// differ only in `?color=` parameters canonicalize identically.
#[must_use]
pub fn canonical_url(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Returns the path portion of a URL (everything from the first `/` after the
/// host), with query and fragment already stripped. Bare paths are returned
/// as-is.
fn url_path(url: &str) -> &str {
    let url = canonical_url(url);
    if let Some(scheme_end) = url.find("://") {
        let after_scheme = &url[scheme_end + 3..];
        match after_scheme.find('/') {
            Some(idx) => &after_scheme[idx..],
            None => "",
        }
    } else {
        url
    }
}

/// Extracts the segment following the first matching prefix.
fn extract_code<'a>(path: &'a str, prefixes: &[String]) -> Option<&'a str> {
    let candidates: Vec<&str> = if prefixes.is_empty() {
        DEFAULT_PREFIXES.to_vec()
    } else {
        prefixes.iter().map(String::as_str).collect()
    };

    for prefix in candidates {
        if let Some(start) = path.find(prefix) {
            let rest = &path[start + prefix.len()..];
            let segment = rest.split('/').next().unwrap_or("");
            if !segment.is_empty() {
                return Some(segment);
            }
        }
    }
    None
}

fn normalize_code(code: &str) -> String {
    percent_decode_str(code)
        .decode_utf8_lossy()
        .trim()
        .to_lowercase()
}
