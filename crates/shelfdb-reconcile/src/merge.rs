//! Field-level merge policy.
//!
//! [`crate::batch`] replays each key's records in ascending timestamp order
//! (ties broken by input order) onto a fresh product via [`merge_record`],
//! then folds prior state from an earlier run in via [`absorb_prior`]. The
//! replay-first arrangement makes a re-run over a superset of previously seen
//! records land on the same product, byte for byte, as a single batch run
//! over those records.
//!
//! Policies, per field kind:
//!
//! - quality scalars (name, category, gender, ...): non-empty replaces, so
//!   the most recent non-empty observation wins and a present value is never
//!   cleared by a missing one;
//! - price state (price, sale price, on-sale): the incoming record wins
//!   outright — an absent sale price deliberately clears a previous sale;
//! - set-valued fields: union, case-insensitive dedupe, first-seen casing,
//!   insertion order;
//! - best-seller and homepage-featured: monotonic, an observation can set
//!   them but never clear them;
//! - timestamps: `last_observed` is the max, `first_observed` the min.

use shelfdb_core::{CanonicalProduct, RawRecord};

use crate::identity::canonical_url;

/// Folds one raw observation into the canonical product.
///
/// Callers must apply records in ascending timestamp order; under that
/// contract the incoming record is always at least as recent as the product,
/// so "most recent wins" reduces to "incoming wins".
pub(crate) fn merge_record(product: &mut CanonicalProduct, record: &RawRecord) {
    merge_quality(&mut product.name, record.name.as_deref());
    merge_quality(&mut product.category, record.category.as_deref());
    merge_quality(&mut product.subcategory, record.subcategory.as_deref());
    merge_quality(&mut product.gender, record.gender.as_deref());
    merge_quality(&mut product.description, record.description.as_deref());
    merge_quality(&mut product.currency, record.currency.as_deref());

    let stripped_url = record.url.as_deref().map(canonical_url);
    merge_quality(&mut product.url, stripped_url);

    product.price = record.price;
    product.sale_price = record.sale_price;
    product.on_sale = record
        .on_sale
        .unwrap_or_else(|| record.sale_price.is_some());

    union_extend(&mut product.colors, &record.colors);
    union_extend(&mut product.sizes, &record.sizes);
    union_extend(&mut product.fabrics, &record.fabrics);
    union_extend(&mut product.badges, &record.badges);
    union_extend(&mut product.images, &record.images);

    if record.is_best_seller == Some(true) || record.best_seller_rank.is_some() {
        product.best_seller = true;
    }
    merge_present(&mut product.best_seller_rank, record.best_seller_rank);
    merge_present(&mut product.review_rating, record.review_rating);
    merge_present(&mut product.review_count, record.review_count);

    if record.homepage_featured == Some(true) {
        product.homepage_featured = true;
    }

    if record.observed_at < product.first_observed {
        product.first_observed = record.observed_at;
    }
    if record.observed_at > product.last_observed {
        product.last_observed = record.observed_at;
    }
}

/// Folds prior state from an earlier run into a freshly replayed product.
///
/// The prior is authoritative for everything at or before its
/// `last_observed`; the replayed product for everything after. A tie on
/// `last_observed` goes to the replayed side, matching the later-input-order
/// rule for identical timestamps. Prior-only union entries land after the
/// replayed ones, which is exactly where a full batch over the combined
/// record set would have put them when the new batch is a superset of the
/// records the prior was built from.
pub(crate) fn absorb_prior(product: &mut CanonicalProduct, prior: CanonicalProduct) {
    let prior_newer = prior.last_observed > product.last_observed;

    absorb_quality(&mut product.name, prior.name, prior_newer);
    absorb_quality(&mut product.category, prior.category, prior_newer);
    absorb_quality(&mut product.subcategory, prior.subcategory, prior_newer);
    absorb_quality(&mut product.gender, prior.gender, prior_newer);
    absorb_quality(&mut product.description, prior.description, prior_newer);
    absorb_quality(&mut product.currency, prior.currency, prior_newer);
    absorb_quality(&mut product.url, prior.url, prior_newer);

    if prior_newer {
        product.price = prior.price;
        product.sale_price = prior.sale_price;
        product.on_sale = prior.on_sale;
    }

    union_extend(&mut product.colors, &prior.colors);
    union_extend(&mut product.sizes, &prior.sizes);
    union_extend(&mut product.fabrics, &prior.fabrics);
    union_extend(&mut product.badges, &prior.badges);
    union_extend(&mut product.images, &prior.images);

    product.best_seller |= prior.best_seller;
    product.homepage_featured |= prior.homepage_featured;
    absorb_present(&mut product.best_seller_rank, prior.best_seller_rank, prior_newer);
    absorb_present(&mut product.review_rating, prior.review_rating, prior_newer);
    absorb_present(&mut product.review_count, prior.review_count, prior_newer);

    if prior.first_observed < product.first_observed {
        product.first_observed = prior.first_observed;
    }
    if prior.last_observed > product.last_observed {
        product.last_observed = prior.last_observed;
    }
}

/// Non-empty incoming value replaces the current one.
fn merge_quality(current: &mut Option<String>, incoming: Option<&str>) {
    if let Some(value) = incoming.map(str::trim).filter(|v| !v.is_empty()) {
        *current = Some(value.to_string());
    }
}

/// A present incoming value replaces the current one.
fn merge_present<T: Copy>(current: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *current = incoming;
    }
}

/// Most-recent-non-empty across the replayed/prior pair.
fn absorb_quality(current: &mut Option<String>, prior: Option<String>, prior_newer: bool) {
    if prior.as_deref().is_none_or(|v| v.trim().is_empty()) {
        return;
    }
    if prior_newer || current.as_deref().is_none_or(|c| c.trim().is_empty()) {
        *current = prior;
    }
}

/// Most-recent-non-null across the replayed/prior pair.
fn absorb_present<T: Copy>(current: &mut Option<T>, prior: Option<T>, prior_newer: bool) {
    if prior.is_some() && (prior_newer || current.is_none()) {
        *current = prior;
    }
}

/// Appends values not already present, comparing case-insensitively while
/// keeping the casing and position of the first sighting.
fn union_extend(dst: &mut Vec<String>, src: &[String]) {
    for value in src {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lowered = trimmed.to_lowercase();
        if !dst.iter().any(|existing| existing.to_lowercase() == lowered) {
            dst.push(trimmed.to_string());
        }
    }
}
