use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Relationship of a source to the portfolio being tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRole {
    /// The brand whose catalog is the reference point.
    Primary,
    Competitor,
}

impl std::fmt::Display for SourceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceRole::Primary => write!(f, "primary"),
            SourceRole::Competitor => write!(f, "competitor"),
        }
    }
}

/// One storefront in the source registry (`config/sources.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub role: SourceRole,
    /// Storefront base URL, required for automated Shopify collection.
    /// Sources fed only by manual browser exports leave this unset.
    pub shop_url: Option<String>,
    /// URL path prefixes that precede the product code on this site.
    /// The segment after the first matching prefix is the identity code.
    #[serde(default = "default_product_path_prefixes")]
    pub product_path_prefixes: Vec<String>,
    pub notes: Option<String>,
}

fn default_product_path_prefixes() -> Vec<String> {
    vec!["/products/".to_string(), "/p/".to_string()]
}

impl SourceConfig {
    /// Generate a URL-safe slug from the source name.
    #[must_use]
    pub fn slug(&self) -> String {
        self.name
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else if c == ' ' {
                    '-'
                } else {
                    '\0'
                }
            })
            .filter(|&c| c != '\0')
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

#[derive(Debug, Deserialize)]
pub struct SourcesFile {
    pub sources: Vec<SourceConfig>,
}

impl SourcesFile {
    /// Looks up a source by slug.
    #[must_use]
    pub fn by_slug(&self, slug: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.slug() == slug)
    }
}

/// Load and validate the source registry from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails
/// validation.
pub fn load_sources(path: &Path) -> Result<SourcesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SourcesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let sources_file: SourcesFile =
        serde_yaml::from_str(&content).map_err(ConfigError::SourcesFileParse)?;

    validate_sources(&sources_file)?;

    Ok(sources_file)
}

fn validate_sources(sources_file: &SourcesFile) -> Result<(), ConfigError> {
    if sources_file.sources.is_empty() {
        return Err(ConfigError::Validation(
            "sources file declares no sources".to_string(),
        ));
    }

    let mut seen_slugs = HashSet::new();

    for source in &sources_file.sources {
        if source.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source name must be non-empty".to_string(),
            ));
        }

        let slug = source.slug();
        if !seen_slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source slug: '{}' (from source '{}')",
                slug, source.name
            )));
        }

        for prefix in &source.product_path_prefixes {
            if !prefix.starts_with('/') || !prefix.ends_with('/') {
                return Err(ConfigError::Validation(format!(
                    "source '{}' has invalid product path prefix '{}'; \
                     prefixes must start and end with '/'",
                    source.name, prefix
                )));
            }
        }

        if source.product_path_prefixes.is_empty() {
            return Err(ConfigError::Validation(format!(
                "source '{}' has no product path prefixes",
                source.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_source(name: &str, role: SourceRole) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            role,
            shop_url: None,
            product_path_prefixes: default_product_path_prefixes(),
            notes: None,
        }
    }

    #[test]
    fn slug_simple_name() {
        let source = make_source("Summit Athletics", SourceRole::Competitor);
        assert_eq!(source.slug(), "summit-athletics");
    }

    #[test]
    fn slug_special_characters() {
        let source = make_source("Peak & Pine Co.", SourceRole::Competitor);
        assert_eq!(source.slug(), "peak-pine-co");
    }

    #[test]
    fn default_prefixes_cover_both_conventions() {
        let yaml = "sources:\n  - name: Rivet\n    role: primary\n";
        let file: SourcesFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            file.sources[0].product_path_prefixes,
            vec!["/products/", "/p/"]
        );
    }

    #[test]
    fn validate_rejects_empty_registry() {
        let file = SourcesFile { sources: vec![] };
        let err = validate_sources(&file).unwrap_err();
        assert!(err.to_string().contains("no sources"));
    }

    #[test]
    fn validate_rejects_empty_name() {
        let file = SourcesFile {
            sources: vec![make_source("  ", SourceRole::Primary)],
        };
        let err = validate_sources(&file).unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }

    #[test]
    fn validate_rejects_duplicate_slug() {
        let file = SourcesFile {
            sources: vec![
                make_source("Summit Athletics", SourceRole::Primary),
                make_source("Summit--Athletics", SourceRole::Competitor),
            ],
        };
        let err = validate_sources(&file).unwrap_err();
        assert!(err.to_string().contains("duplicate source slug"));
    }

    #[test]
    fn validate_rejects_malformed_prefix() {
        let mut source = make_source("Rivet", SourceRole::Primary);
        source.product_path_prefixes = vec!["products/".to_string()];
        let file = SourcesFile {
            sources: vec![source],
        };
        let err = validate_sources(&file).unwrap_err();
        assert!(err.to_string().contains("invalid product path prefix"));
    }

    #[test]
    fn validate_rejects_no_prefixes() {
        let mut source = make_source("Rivet", SourceRole::Primary);
        source.product_path_prefixes = vec![];
        let file = SourcesFile {
            sources: vec![source],
        };
        let err = validate_sources(&file).unwrap_err();
        assert!(err.to_string().contains("no product path prefixes"));
    }

    #[test]
    fn by_slug_finds_source() {
        let file = SourcesFile {
            sources: vec![
                make_source("Rivet", SourceRole::Primary),
                make_source("Summit Athletics", SourceRole::Competitor),
            ],
        };
        assert!(file.by_slug("summit-athletics").is_some());
        assert!(file.by_slug("nope").is_none());
    }

    #[test]
    fn role_display() {
        assert_eq!(SourceRole::Primary.to_string(), "primary");
        assert_eq!(SourceRole::Competitor.to_string(), "competitor");
    }
}
