//! Reconciliation of raw product observations into canonical products.
//!
//! This crate is the pure center of the pipeline: extractors upstream produce
//! [`shelfdb_core::RawRecord`]s however they like, the store adapter
//! downstream persists whatever comes out, and everything in between — identity
//! resolution, field-level merge policy, batch folding — lives here with no
//! I/O, no async, and no shared state, so every behavior is directly testable.

mod batch;
mod error;
mod identity;
mod merge;

pub use batch::{Reconciler, Reconciliation, ReconcileSummary};
pub use error::IdentityError;
pub use identity::{canonical_url, resolve_identity, IdentityRules};
