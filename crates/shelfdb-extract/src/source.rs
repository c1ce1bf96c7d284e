use shelfdb_core::RawRecord;

use crate::error::ExtractError;

/// What one extraction pass yielded.
///
/// `malformed` counts input elements that were not product-shaped at all and
/// were dropped at the deserialization boundary. They are reported alongside
/// unidentifiable records in the reconciliation summary; a bad element never
/// aborts the pass.
#[derive(Debug, Default)]
pub struct Harvest {
    pub records: Vec<RawRecord>,
    pub malformed: usize,
}

impl Harvest {
    /// Folds another harvest into this one.
    pub fn absorb(&mut self, other: Harvest) {
        self.records.extend(other.records);
        self.malformed += other.malformed;
    }
}

/// A per-site extractor, polymorphic over how the candidates are produced.
///
/// Implementations own every site-specific detail — endpoints, pagination,
/// export-file quirks. The reconciler never learns where a record came from
/// beyond its `source` slug.
#[allow(async_fn_in_trait)] // implementations are consumed locally, not boxed
pub trait ProductSource {
    /// Slug of the source this extractor feeds, matching the source registry.
    fn slug(&self) -> &str;

    /// Produces one finite batch of candidate records.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] when the pass as a whole cannot proceed
    /// (unreadable file, unreachable storefront). Individually bad elements
    /// are counted in the harvest instead.
    async fn produce_candidates(&self) -> Result<Harvest, ExtractError>;
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn absorb_concatenates_records_and_sums_malformed() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let mut a = Harvest {
            records: vec![RawRecord::new("rivet", t)],
            malformed: 1,
        };
        let b = Harvest {
            records: vec![RawRecord::new("rivet", t), RawRecord::new("rivet", t)],
            malformed: 2,
        };
        a.absorb(b);
        assert_eq!(a.records.len(), 3);
        assert_eq!(a.malformed, 3);
    }
}
