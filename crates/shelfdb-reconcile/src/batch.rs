//! Batch reconciliation: an unordered pile of observations in, the minimal
//! canonical product set and a run summary out.

use std::collections::BTreeMap;

use shelfdb_core::{CanonicalProduct, IdentityKey, RawRecord};

use crate::identity::{resolve_identity, IdentityRules};
use crate::merge::{absorb_prior, merge_record};

/// The reconciliation engine. Holds only the per-source identity rules;
/// reconciliation itself is a pure function of its inputs.
#[derive(Debug, Clone)]
pub struct Reconciler {
    rules: IdentityRules,
}

/// Output of one reconciliation run.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// One canonical product per identity key. `BTreeMap` so iteration (and
    /// therefore downstream output) is stable across runs and input
    /// orderings.
    pub products: BTreeMap<IdentityKey, CanonicalProduct>,
    pub summary: ReconcileSummary,
}

/// Operator-facing counts for one reconciliation run.
///
/// The merged-per-identity stats cover identities that received at least one
/// record this run; an identity with an unexpectedly high merge count usually
/// means a color-variant explosion the identity rules did not collapse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileSummary {
    pub records_in: usize,
    pub unique_identities: usize,
    pub unidentifiable: usize,
    pub min_merged: usize,
    pub max_merged: usize,
    pub mean_merged: f64,
}

impl ReconcileSummary {
    /// Counts records that failed to deserialize upstream. Malformed input is
    /// tallied alongside unidentifiable records: both were presented to the
    /// pipeline and excluded from every canonical product.
    pub fn add_malformed(&mut self, count: usize) {
        self.records_in += count;
        self.unidentifiable += count;
    }
}

impl std::fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} records in, {} unique identities, {} unidentifiable, \
             merged per identity min/max/mean {}/{}/{:.2}",
            self.records_in,
            self.unique_identities,
            self.unidentifiable,
            self.min_merged,
            self.max_merged,
            self.mean_merged,
        )
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(rules: IdentityRules) -> Self {
        Self { rules }
    }

    /// Reconciles a finite batch of raw records onto an optional prior
    /// canonical set.
    ///
    /// Pure and deterministic: given the same prior state and the same set of
    /// records, the output is identical regardless of input order. Records
    /// for one key are sorted by observation timestamp (a stable sort, so
    /// records sharing a timestamp keep their input order and the later one
    /// wins scalar ties), replayed onto a fresh product, and the prior state
    /// folded in afterwards. Re-running a batch that is a superset of the
    /// records the prior was built from therefore lands on the same product,
    /// byte for byte, as a single run over the full batch. Records that fail
    /// identity resolution are dropped and counted, never merged.
    ///
    /// Prior products that receive no new records pass through unchanged.
    #[must_use]
    pub fn reconcile(
        &self,
        prior: BTreeMap<IdentityKey, CanonicalProduct>,
        records: impl IntoIterator<Item = RawRecord>,
    ) -> Reconciliation {
        let mut products = prior;
        let mut grouped: BTreeMap<IdentityKey, Vec<RawRecord>> = BTreeMap::new();

        let mut records_in = 0usize;
        let mut unidentifiable = 0usize;

        for record in records {
            records_in += 1;
            match resolve_identity(&self.rules, &record) {
                Ok(key) => grouped.entry(key).or_default().push(record),
                Err(_) => unidentifiable += 1,
            }
        }

        let touched = grouped.len();
        let mut min_merged = usize::MAX;
        let mut max_merged = 0usize;
        let mut total_merged = 0usize;

        for (key, mut group) in grouped {
            // Stable: input order survives for identical timestamps.
            group.sort_by_key(|r| r.observed_at);

            min_merged = min_merged.min(group.len());
            max_merged = max_merged.max(group.len());
            total_merged += group.len();

            let mut product =
                CanonicalProduct::first_sighting(key.clone(), group[0].observed_at);
            for record in &group {
                merge_record(&mut product, record);
            }
            if let Some(prior) = products.remove(&key) {
                absorb_prior(&mut product, prior);
            }
            products.insert(key, product);
        }

        #[allow(clippy::cast_precision_loss)] // counts are far below 2^52
        let mean_merged = if touched == 0 {
            0.0
        } else {
            total_merged as f64 / touched as f64
        };

        let summary = ReconcileSummary {
            records_in,
            unique_identities: products.len(),
            unidentifiable,
            min_merged: if touched == 0 { 0 } else { min_merged },
            max_merged,
            mean_merged,
        };

        Reconciliation { products, summary }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::*;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(IdentityRules::with_defaults())
    }

    fn tee_record(
        hour: u32,
        color: &str,
        price: i64,
        on_sale: bool,
        query: &str,
    ) -> RawRecord {
        let mut record = RawRecord::new("rivet", ts(hour));
        record.url = Some(format!("https://rivet.com/products/tee{query}"));
        record.name = Some("Strato Tech Tee".to_string());
        record.colors = vec![color.to_string()];
        record.price = Some(Decimal::new(price * 100, 2));
        record.on_sale = Some(on_sale);
        if on_sale {
            record.sale_price = Some(Decimal::new(price * 100, 2));
        }
        record
    }

    /// The worked five-plus-one scenario: three color-variant observations of
    /// one tee, one unrelated product, plus two unidentifiable-free checks on
    /// the summary.
    #[test]
    fn variant_urls_collapse_into_one_product() {
        let records = vec![
            tee_record(1, "Black", 40, false, "?color=black"),
            tee_record(2, "Navy", 40, false, "?color=navy"),
            tee_record(3, "Red", 32, true, "?color=red"),
            {
                let mut shorts = RawRecord::new("rivet", ts(2));
                shorts.url = Some("https://rivet.com/products/shorts".to_string());
                shorts.name = Some("Banks Short".to_string());
                shorts
            },
        ];

        let result = reconciler().reconcile(BTreeMap::new(), records);

        assert_eq!(result.products.len(), 2);
        assert_eq!(result.summary.records_in, 4);
        assert_eq!(result.summary.unique_identities, 2);
        assert_eq!(result.summary.unidentifiable, 0);
        assert_eq!(result.summary.min_merged, 1);
        assert_eq!(result.summary.max_merged, 3);
        assert!((result.summary.mean_merged - 2.0).abs() < f64::EPSILON);

        let tee = &result.products[&IdentityKey::new("rivet", "tee")];
        assert_eq!(tee.colors, vec!["Black", "Navy", "Red"]);
        assert_eq!(tee.price, Some(Decimal::new(3200, 2)));
        assert!(tee.on_sale);
        assert_eq!(tee.url.as_deref(), Some("https://rivet.com/products/tee"));

        let shorts = &result.products[&IdentityKey::new("rivet", "shorts")];
        assert_eq!(shorts.colors, Vec::<String>::new());
        assert_eq!(shorts.name.as_deref(), Some("Banks Short"));
    }

    /// Follow-up scenario: fold one new observation onto the prior state.
    #[test]
    fn incremental_pass_extends_prior_state() {
        let first = reconciler().reconcile(
            BTreeMap::new(),
            vec![
                tee_record(1, "Black", 40, false, "?color=black"),
                tee_record(2, "Navy", 40, false, "?color=navy"),
                tee_record(3, "Red", 32, true, "?color=red"),
            ],
        );

        let update = tee_record(4, "Charcoal", 40, false, "?color=charcoal");
        let result = reconciler().reconcile(first.products, vec![update]);

        let tee = &result.products[&IdentityKey::new("rivet", "tee")];
        // New-batch entries come first; prior-only entries keep their
        // relative order at the tail.
        assert_eq!(tee.colors, vec!["Charcoal", "Black", "Navy", "Red"]);
        assert_eq!(tee.price, Some(Decimal::new(4000, 2)));
        assert!(!tee.on_sale);
        assert_eq!(tee.first_observed, ts(1));
        assert_eq!(tee.last_observed, ts(4));
    }

    #[test]
    fn idempotent_when_reconciled_against_own_output() {
        let records = vec![
            tee_record(1, "Black", 40, false, "?color=black"),
            tee_record(2, "Navy", 40, false, "?color=navy"),
            tee_record(3, "Red", 32, true, "?color=red"),
        ];

        let once = reconciler().reconcile(BTreeMap::new(), records.clone());
        let again = reconciler().reconcile(once.products.clone(), records);

        assert_eq!(once.products, again.products);
    }

    #[test]
    fn output_is_independent_of_input_order() {
        let records = vec![
            tee_record(1, "Black", 40, false, "?color=black"),
            tee_record(2, "Navy", 40, false, "?color=navy"),
            tee_record(3, "Red", 32, true, "?color=red"),
        ];

        let forward = reconciler().reconcile(BTreeMap::new(), records.clone());
        let reversed: Vec<RawRecord> = records.into_iter().rev().collect();
        let backward = reconciler().reconcile(BTreeMap::new(), reversed);

        assert_eq!(forward.products, backward.products);
        // Byte-identical, not just structurally equal.
        let a: Vec<&CanonicalProduct> = forward.products.values().collect();
        let b: Vec<&CanonicalProduct> = backward.products.values().collect();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    /// Re-running a full export after a partial run must land on exactly the
    /// state a single full run would have produced, down to union ordering.
    #[test]
    fn superset_rerun_matches_single_batch_run() {
        let black = tee_record(1, "Black", 40, false, "?color=black");
        let red = tee_record(3, "Red", 32, true, "?color=red");

        let single = reconciler().reconcile(BTreeMap::new(), vec![black.clone(), red.clone()]);

        let partial = reconciler().reconcile(BTreeMap::new(), vec![red.clone()]);
        let rerun = reconciler().reconcile(partial.products, vec![black, red]);

        assert_eq!(single.products, rerun.products);
        let a: Vec<&CanonicalProduct> = single.products.values().collect();
        let b: Vec<&CanonicalProduct> = rerun.products.values().collect();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn union_fields_never_shrink_as_records_accumulate() {
        let mut state = BTreeMap::new();
        let mut seen = 0usize;
        for (hour, color) in [(1, "Black"), (2, "Navy"), (3, "Red"), (4, "Black")] {
            let result = reconciler().reconcile(
                state,
                vec![tee_record(hour, color, 40, false, "?x=1")],
            );
            let tee = &result.products[&IdentityKey::new("rivet", "tee")];
            assert!(tee.colors.len() >= seen);
            seen = tee.colors.len();
            state = result.products;
        }
        assert_eq!(seen, 3);
    }

    #[test]
    fn newest_null_price_clears_previous_sale() {
        let mut on_sale = tee_record(1, "Black", 32, true, "");
        on_sale.sale_price = Some(Decimal::new(3200, 2));

        let mut later = RawRecord::new("rivet", ts(2));
        later.url = Some("https://rivet.com/products/tee".to_string());
        // Price fields absent entirely on the later observation.

        let result = reconciler().reconcile(BTreeMap::new(), vec![on_sale, later]);
        let tee = &result.products[&IdentityKey::new("rivet", "tee")];
        assert_eq!(tee.price, None);
        assert_eq!(tee.sale_price, None);
        assert!(!tee.on_sale);
    }

    #[test]
    fn unidentifiable_records_are_counted_and_isolated() {
        let mut nameless = RawRecord::new("rivet", ts(1));
        nameless.url = Some("https://rivet.com/collections/sale".to_string());
        nameless.colors = vec!["Chartreuse".to_string()];

        let result = reconciler().reconcile(
            BTreeMap::new(),
            vec![nameless, tee_record(2, "Black", 40, false, "")],
        );

        assert_eq!(result.summary.unidentifiable, 1);
        assert_eq!(result.products.len(), 1);
        let tee = &result.products[&IdentityKey::new("rivet", "tee")];
        // Nothing from the dropped record leaked into the surviving product.
        assert_eq!(tee.colors, vec!["Black"]);
    }

    #[test]
    fn identical_timestamps_resolve_to_later_input_order() {
        let mut a = tee_record(2, "Black", 40, false, "");
        a.name = Some("Name A".to_string());
        let mut b = tee_record(2, "Navy", 36, false, "");
        b.name = Some("Name B".to_string());

        let result = reconciler().reconcile(BTreeMap::new(), vec![a, b]);
        let tee = &result.products[&IdentityKey::new("rivet", "tee")];
        assert_eq!(tee.name.as_deref(), Some("Name B"));
        assert_eq!(tee.price, Some(Decimal::new(3600, 2)));
        // Unions are order-of-arrival regardless of the tie.
        assert_eq!(tee.colors, vec!["Black", "Navy"]);
    }

    #[test]
    fn untouched_prior_products_pass_through() {
        let first = reconciler().reconcile(
            BTreeMap::new(),
            vec![
                tee_record(1, "Black", 40, false, ""),
                {
                    let mut shorts = RawRecord::new("rivet", ts(1));
                    shorts.url = Some("https://rivet.com/products/shorts".to_string());
                    shorts
                },
            ],
        );

        let second = reconciler().reconcile(
            first.products.clone(),
            vec![tee_record(2, "Navy", 40, false, "")],
        );

        assert_eq!(
            second.products[&IdentityKey::new("rivet", "shorts")],
            first.products[&IdentityKey::new("rivet", "shorts")]
        );
        assert_eq!(second.summary.unique_identities, 2);
        // Merge stats cover only the identity that received records.
        assert_eq!(second.summary.max_merged, 1);
    }

    #[test]
    fn empty_batch_yields_empty_summary() {
        let result = reconciler().reconcile(BTreeMap::new(), vec![]);
        assert_eq!(result.summary, ReconcileSummary::default());
        assert!(result.products.is_empty());
    }

    #[test]
    fn add_malformed_counts_into_both_totals() {
        let mut summary = ReconcileSummary {
            records_in: 5,
            unique_identities: 3,
            unidentifiable: 1,
            min_merged: 1,
            max_merged: 3,
            mean_merged: 1.5,
        };
        summary.add_malformed(2);
        assert_eq!(summary.records_in, 7);
        assert_eq!(summary.unidentifiable, 3);
    }

    #[test]
    fn summary_display_is_operator_readable() {
        let summary = ReconcileSummary {
            records_in: 6,
            unique_identities: 2,
            unidentifiable: 0,
            min_merged: 1,
            max_merged: 5,
            mean_merged: 3.0,
        };
        let line = summary.to_string();
        assert!(line.contains("6 records in"));
        assert!(line.contains("2 unique identities"));
        assert!(line.contains("1/5/3.00"));
    }
}
