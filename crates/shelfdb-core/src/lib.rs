use thiserror::Error;

pub mod app_config;
pub mod config;
pub mod product;
pub mod raw;
pub mod sources;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use product::{CanonicalProduct, IdentityKey};
pub use raw::RawRecord;
pub use sources::{load_sources, SourceConfig, SourceRole, SourcesFile};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read sources file {path}: {source}")]
    SourcesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sources file: {0}")]
    SourcesFileParse(#[from] serde_yaml::Error),

    #[error("invalid sources configuration: {0}")]
    Validation(String),
}
