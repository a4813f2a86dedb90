//! Metadata configuration via `docshape.toml`
//!
//! Controls how much of each collection is sampled when the resource model
//! is first built, and whether documents seen later may extend it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "docshape.toml";

/// Sample every document in each collection
pub const PREFETCH_ALL: i64 = -1;

/// Configuration for metadata inference and query translation
///
/// # Example
///
/// ```toml
/// prefetch_count = 100
/// update_dynamically = true
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetadataConfig {
    /// Documents sampled per collection: 0 = none, negative = all
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: i64,
    /// Fold documents returned by queries into the shared model
    #[serde(default)]
    pub update_dynamically: bool,
    /// Sample from the end of the natural order instead of the start
    #[serde(default)]
    pub fetch_from_end: bool,
    /// Name embedded object types by field name only
    #[serde(default)]
    pub use_global_complex_type_names: bool,
    /// Drop an ascending secondary ordering on the synthetic key
    #[serde(default = "default_elide_natural_tiebreak")]
    pub elide_natural_tiebreak: bool,
}

fn default_prefetch_count() -> i64 {
    PREFETCH_ALL
}

fn default_elide_natural_tiebreak() -> bool {
    true
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            prefetch_count: default_prefetch_count(),
            update_dynamically: false,
            fetch_from_end: false,
            use_global_complex_type_names: false,
            elide_natural_tiebreak: default_elide_natural_tiebreak(),
        }
    }
}

impl MetadataConfig {
    /// Config with a given prefetch count and defaults otherwise
    pub fn with_prefetch(prefetch_count: i64) -> Self {
        Self {
            prefetch_count,
            ..Self::default()
        }
    }

    /// Number of documents to sample, or None for the whole collection
    pub fn sample_limit(&self) -> Option<usize> {
        if self.prefetch_count < 0 {
            None
        } else {
            Some(usize::try_from(self.prefetch_count).unwrap_or(usize::MAX))
        }
    }

    /// Check option combinations
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `fetch_from_end` is set while nothing is sampled.
    pub fn validate(&self) -> Result<()> {
        if self.prefetch_count == 0 && self.fetch_from_end {
            return Err(Error::Config(
                "fetch_from_end has no effect with prefetch_count = 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Docshape metadata configuration
#
# Documents sampled per collection when the model is first built.
#   -1 = whole collection (default), 0 = none (key only), N = first N
prefetch_count = -1

# Extend the shared model with fields found in query results (default: false)
update_dynamically = false

# Sample the most recent documents instead of the oldest (default: false)
fetch_from_end = false

# Name embedded object types "<field>" instead of "<collection>_<field>"
use_global_complex_type_names = false

# Drop "then by db_id ascending" after another ordering (default: true)
elide_natural_tiebreak = true
"#
    }

    /// Parse and validate config text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MetadataConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{} ({})", msg, path.display())),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
