//! Share-pack document parser.
//!
//! This module handles loading a share-pack document from YAML or JSON,
//! with environment overrides for the pack metadata.

use crate::error::{ConfigError, Result, SharePackError};
use std::path::Path;
use tracing::{debug, info};

use super::spec::SharePackConfig;

/// Parser for share-pack documents.
#[derive(Debug, Default)]
pub struct PackParser;

impl PackParser {
    /// Creates a new pack parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Loads a share pack from a YAML or JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<SharePackConfig> {
        let path = path.as_ref();
        info!("Loading share pack from: {}", path.display());

        if !path.exists() {
            return Err(SharePackError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            SharePackError::Config(ConfigError::ParseError {
                message: format!("Failed to read {}: {e}", path.display()),
            })
        })?;

        if path.extension().is_some_and(|ext| ext == "json") {
            self.parse_json(&content)
        } else {
            self.parse_yaml(&content)
        }
    }

    /// Parses a share pack from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str) -> Result<SharePackConfig> {
        debug!("Parsing YAML share pack");

        let config: SharePackConfig = serde_yaml::from_str(content).map_err(|e| {
            SharePackError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
            })
        })?;

        debug!("Parsed share pack: {}", config.metadata.name);
        Ok(config)
    }

    /// Parses a share pack from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid.
    pub fn parse_json(&self, content: &str) -> Result<SharePackConfig> {
        debug!("Parsing JSON share pack");

        let config: SharePackConfig = serde_json::from_str(content).map_err(|e| {
            SharePackError::Config(ConfigError::ParseError {
                message: format!("JSON parse error: {e}"),
            })
        })?;

        debug!("Parsed share pack: {}", config.metadata.name);
        Ok(config)
    }

    /// Loads a share pack with environment overrides applied.
    ///
    /// Overrides: `SHAREPACK_WORKSPACE`, `SHAREPACK_CATALOG`,
    /// `SHAREPACK_SCHEMA`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<SharePackConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Applies environment variable overrides to the pack metadata.
    fn apply_env_overrides(config: &mut SharePackConfig) {
        if let Ok(workspace) = std::env::var("SHAREPACK_WORKSPACE") {
            debug!("Overriding metadata.workspace from environment");
            config.metadata.workspace = workspace;
        }

        if let Ok(catalog) = std::env::var("SHAREPACK_CATALOG") {
            debug!("Overriding metadata.catalog from environment");
            config.metadata.catalog = Some(catalog);
        }

        if let Ok(schema) = std::env::var("SHAREPACK_SCHEMA") {
            debug!("Overriding metadata.schema from environment");
            config.metadata.schema = Some(schema);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::Strategy;

    #[test]
    fn test_parse_minimal_pack() {
        let yaml = r"
metadata:
  name: sales-pack
  workspace: analytics
  strategy: NEW
";
        let parser = PackParser::new();
        let config = parser.parse_yaml(yaml).expect("parse should succeed");
        assert_eq!(config.metadata.name, "sales-pack");
        assert_eq!(config.metadata.strategy, Strategy::New);
        assert!(config.recipients.is_empty());
        assert!(config.shares.is_empty());
    }

    #[test]
    fn test_parse_full_pack() {
        let yaml = r#"
metadata:
  name: sales-pack
  workspace: analytics
  strategy: UPDATE
  catalog: main
  schema: shared

recipients:
  - name: acme
    description: ACME Corp
    ip_access_list:
      - "10.0.0.0/8"
  - name: partner-org
    kind:
      type: d2d
      sharing_org_id: org-42

shares:
  - name: sales
    description: Sales data share
    assets:
      - main.shared.orders
      - main.shared.customers
    recipients:
      - acme
      - partner-org
    pipelines:
      - name: orders-scd2
        source_table: main.raw.orders
        target_table: main.shared.orders
        scd_type: type2
        schedule:
          kind: cron
          expr: "0 0 2 * * ?"
          timezone: America/New_York
      - name: customers-live
        source_table: main.raw.customers
        target_table: main.shared.customers
        scd_type: type1
        schedule:
          kind: continuous
"#;
        let parser = PackParser::new();
        let config = parser.parse_yaml(yaml).expect("parse should succeed");
        assert_eq!(config.recipients.len(), 2);
        assert_eq!(config.shares.len(), 1);
        assert_eq!(config.pipeline_count(), 2);
        assert_eq!(config.recipients[1].kind.sharing_org_id(), Some("org-42"));
    }

    #[test]
    fn test_parse_delete_pack_reduced_shape() {
        let yaml = r"
metadata:
  name: sales-pack
  workspace: analytics
  strategy: DELETE

recipients:
  - name: acme

shares:
  - name: sales
    pipelines:
      - name: orders-scd2
";
        let parser = PackParser::new();
        let config = parser.parse_yaml(yaml).expect("parse should succeed");
        assert_eq!(config.metadata.strategy, Strategy::Delete);
        assert!(config.shares[0].pipelines[0].source_table.is_none());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let parser = PackParser::new();
        assert!(parser.parse_yaml("metadata: [not a map").is_err());
    }
}
