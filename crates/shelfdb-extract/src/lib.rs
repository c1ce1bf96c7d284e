//! Extractor boundary: everything that turns an external catalog — a manual
//! browser-export file or a live Shopify storefront — into
//! [`shelfdb_core::RawRecord`]s for reconciliation.
//!
//! Per-site quirks stay on this side of the line. The reconciler downstream
//! only ever sees the common record shape.

mod categorize;
mod error;
mod export;
mod shopify;
mod source;

pub use categorize::infer_category;
pub use error::ExtractError;
pub use export::{load_export_file, load_export_files, ExportFileSource};
pub use shopify::{ShopifySource, StorefrontClient};
pub use source::{Harvest, ProductSource};
