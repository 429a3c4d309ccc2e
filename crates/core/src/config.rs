//! Configuration via `tabula.toml`
//!
//! A small config file read once when a schema manager or Dao is built.
//! Missing keys fall back to their defaults, so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Config file name placed in a configuration directory.
pub const CONFIG_FILE_NAME: &str = "tabula.toml";

/// Configuration loaded from `tabula.toml`.
///
/// # Example
///
/// ```toml
/// managed_schema_table = "managed_schemas"
/// scanner_caching = 100
/// default_parser = "json"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabulaConfig {
    /// Name of the table holding schema history for every entity.
    #[serde(default = "default_managed_schema_table")]
    pub managed_schema_table: String,
    /// Rows fetched per substrate round-trip by an entity scanner.
    #[serde(default = "default_scanner_caching")]
    pub scanner_caching: usize,
    /// Parser identifier recorded for schemas created without one.
    #[serde(default = "default_parser")]
    pub default_parser: String,
}

fn default_managed_schema_table() -> String {
    "managed_schemas".to_string()
}

fn default_scanner_caching() -> usize {
    100
}

fn default_parser() -> String {
    "json".to_string()
}

impl Default for TabulaConfig {
    fn default() -> Self {
        Self {
            managed_schema_table: default_managed_schema_table(),
            scanner_caching: default_scanner_caching(),
            default_parser: default_parser(),
        }
    }
}

impl TabulaConfig {
    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns a config error for an empty table name, a zero scanner
    /// caching size, or an empty parser identifier.
    pub fn validate(&self) -> Result<()> {
        if self.managed_schema_table.is_empty() {
            return Err(Error::Config(
                "managed_schema_table must not be empty".to_string(),
            ));
        }
        if self.scanner_caching == 0 {
            return Err(Error::Config(
                "scanner_caching must be at least 1".to_string(),
            ));
        }
        if self.default_parser.is_empty() {
            return Err(Error::Config("default_parser must not be empty".to_string()));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tabula configuration
#
# Table that stores every entity's schema history.
managed_schema_table = "managed_schemas"

# Rows fetched per round-trip while scanning entities.
scanner_caching = 100

# Schema parser used when none is named at creation.
default_parser = "json"
"#
    }

    /// Parse and validate config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TabulaConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Load `tabula.toml` from `dir`, writing the default file first if it
    /// does not exist.
    pub fn load_or_create(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            std::fs::write(&path, Self::default_toml())?;
        }
        Self::from_file(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = TabulaConfig::default();
        assert_eq!(config.managed_schema_table, "managed_schemas");
        assert_eq!(config.scanner_caching, 100);
        assert_eq!(config.default_parser, "json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_toml_parses_to_default() {
        let config = TabulaConfig::from_toml_str(TabulaConfig::default_toml()).unwrap();
        assert_eq!(config, TabulaConfig::default());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = TabulaConfig::from_toml_str("").unwrap();
        assert_eq!(config, TabulaConfig::default());
    }

    #[test]
    fn zero_caching_is_rejected() {
        let result = TabulaConfig::from_toml_str("scanner_caching = 0");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let result = TabulaConfig::from_toml_str("scanner_caching = \"lots\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn load_or_create_writes_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        let config = TabulaConfig::load_or_create(dir.path()).unwrap();
        assert!(path.exists());
        assert_eq!(config, TabulaConfig::default());
    }

    #[test]
    fn load_or_create_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "managed_schema_table = \"schemas_v2\"\n").unwrap();

        let config = TabulaConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(config.managed_schema_table, "schemas_v2");
        assert_eq!(config.scanner_caching, 100);
    }

    #[test]
    fn round_trip_through_toml() {
        let config = TabulaConfig {
            managed_schema_table: "ms".to_string(),
            scanner_caching: 7,
            default_parser: "json".to_string(),
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(TabulaConfig::from_toml_str(&text).unwrap(), config);
    }
}
