use thiserror::Error;

/// Why a record could not be assigned an identity key.
///
/// Never fatal to a batch: callers drop the record and count it as
/// unidentifiable.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("record from '{source_slug}' has neither a URL nor a product code")]
    MissingHint { source_slug: String },

    #[error("no product code found in URL '{url}'")]
    NoCodeInUrl { url: String },

    #[error("product code resolved to an empty string from '{origin}'")]
    EmptyCode { origin: String },
}
