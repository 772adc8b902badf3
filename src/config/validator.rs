//! Share-pack validation.
//!
//! This module validates a share-pack document before any remote call is
//! made: duplicate names, per-strategy shape, contradictory membership
//! lists, and schedule sanity. Validation failures never require rollback
//! because nothing has been mutated yet.

use crate::error::{ConfigError, Result, SharePackError};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{PipelineSpec, RecipientSpec, Schedule, SharePackConfig, ShareSpec, Strategy};

/// Validator for share-pack documents.
#[derive(Debug, Default)]
pub struct PackValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl PackValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a share-pack document.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found; contradictory membership
    /// lists are reported as [`ConfigError::ConflictingMembership`] naming
    /// every offending value.
    pub fn validate(&self, config: &SharePackConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_metadata(config, &mut result);
        Self::validate_recipients(&config.recipients, &mut result);

        let mut seen_shares = HashSet::new();
        for share in &config.shares {
            if !seen_shares.insert(share.name.as_str()) {
                return Err(SharePackError::Config(ConfigError::DuplicateName {
                    resource_type: String::from("share"),
                    name: share.name.clone(),
                }));
            }
            Self::validate_share(share, config.metadata.strategy, &mut result)?;
        }

        if result.errors.is_empty() {
            debug!("Share pack validation passed");
            Ok(result)
        } else {
            let first = &result.errors[0];
            Err(SharePackError::Config(ConfigError::ValidationError {
                message: first.message.clone(),
                field: Some(first.field.clone()),
            }))
        }
    }

    /// Validates pack metadata.
    fn validate_metadata(config: &SharePackConfig, result: &mut ValidationResult) {
        if config.metadata.name.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("metadata.name"),
                message: String::from("Pack name cannot be empty"),
            });
        } else if !is_valid_name(&config.metadata.name) {
            result.errors.push(ValidationError {
                field: String::from("metadata.name"),
                message: format!(
                    "Pack name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    config.metadata.name
                ),
            });
        }

        if config.metadata.workspace.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("metadata.workspace"),
                message: String::from("Workspace cannot be empty"),
            });
        }

        if config.recipients.is_empty() && config.shares.is_empty() {
            result.warnings.push(String::from(
                "Share pack defines no recipients and no shares",
            ));
        }
    }

    /// Validates recipient specs.
    fn validate_recipients(recipients: &[RecipientSpec], result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for recipient in recipients {
            if recipient.name.is_empty() {
                result.errors.push(ValidationError {
                    field: String::from("recipients.name"),
                    message: String::from("Recipient name cannot be empty"),
                });
                continue;
            }
            if !seen.insert(recipient.name.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("recipients.{}", recipient.name),
                    message: format!("Duplicate recipient name: {}", recipient.name),
                });
            }
            if let Some(org) = recipient.kind.sharing_org_id()
                && org.is_empty()
            {
                result.errors.push(ValidationError {
                    field: format!("recipients.{}.sharing_org_id", recipient.name),
                    message: String::from("D2D recipients require a sharing_org_id"),
                });
            }
        }
    }

    /// Validates a single share spec, including its pipelines.
    fn validate_share(
        share: &ShareSpec,
        strategy: Strategy,
        result: &mut ValidationResult,
    ) -> Result<()> {
        if share.name.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("shares.name"),
                message: String::from("Share name cannot be empty"),
            });
            return Ok(());
        }

        // Contradictory membership lists fail fast regardless of strategy.
        check_conflicts(&share.name, "assets", &share.assets, &share.assets_to_remove)?;
        check_conflicts(
            &share.name,
            "assets",
            &share.assets_to_add,
            &share.assets_to_remove,
        )?;
        check_conflicts(
            &share.name,
            "recipients",
            &share.recipients,
            &share.recipients_to_remove,
        )?;
        check_conflicts(
            &share.name,
            "recipients",
            &share.recipients_to_add,
            &share.recipients_to_remove,
        )?;

        let mut seen_pipelines = HashSet::new();
        let mut seen_targets = HashSet::new();
        for pipeline in &share.pipelines {
            if !seen_pipelines.insert(pipeline.name.as_str()) {
                return Err(SharePackError::Config(ConfigError::DuplicateName {
                    resource_type: String::from("pipeline"),
                    name: pipeline.name.clone(),
                }));
            }
            if let Some(target) = &pipeline.target_table
                && !seen_targets.insert(target.as_str())
            {
                result.errors.push(ValidationError {
                    field: format!("shares.{}.pipelines.{}", share.name, pipeline.name),
                    message: format!("Multiple pipelines target {target}"),
                });
            }
            Self::validate_pipeline(&share.name, pipeline, strategy, result);
        }

        Ok(())
    }

    /// Validates a single pipeline spec against the pack strategy.
    fn validate_pipeline(
        share_name: &str,
        pipeline: &PipelineSpec,
        strategy: Strategy,
        result: &mut ValidationResult,
    ) {
        if pipeline.name.is_empty() {
            result.errors.push(ValidationError {
                field: format!("shares.{share_name}.pipelines.name"),
                message: String::from("Pipeline name cannot be empty"),
            });
            return;
        }

        // DELETE accepts a name-only shape; the converge strategies need the
        // full pipeline definition.
        if matches!(strategy, Strategy::Delete) {
            return;
        }

        for (field, value) in [
            ("source_table", pipeline.source_table.as_deref()),
            ("target_table", pipeline.target_table.as_deref()),
        ] {
            if value.is_none_or(str::is_empty) {
                result.errors.push(ValidationError {
                    field: format!("shares.{share_name}.pipelines.{}.{field}", pipeline.name),
                    message: format!("Pipeline '{}' requires {field}", pipeline.name),
                });
            }
        }

        if pipeline.scd_type.is_none() {
            result.errors.push(ValidationError {
                field: format!("shares.{share_name}.pipelines.{}.scd_type", pipeline.name),
                message: format!("Pipeline '{}' requires scd_type", pipeline.name),
            });
        }

        if let Some(Schedule::Cron { expr, timezone }) = &pipeline.schedule {
            if expr.split_whitespace().count() < 5 {
                result.errors.push(ValidationError {
                    field: format!("shares.{share_name}.pipelines.{}.schedule", pipeline.name),
                    message: format!("Cron expression '{expr}' is too short"),
                });
            }
            if timezone.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("shares.{share_name}.pipelines.{}.schedule", pipeline.name),
                    message: String::from("Cron timezone cannot be empty"),
                });
            }
        }
    }
}

/// Fails with a [`ConfigError::ConflictingMembership`] if the two lists
/// intersect.
fn check_conflicts(owner: &str, field: &str, keep: &[String], remove: &[String]) -> Result<()> {
    if keep.is_empty() || remove.is_empty() {
        return Ok(());
    }

    let remove_set: HashSet<&str> = remove.iter().map(String::as_str).collect();
    let mut conflicts: Vec<String> = keep
        .iter()
        .filter(|v| remove_set.contains(v.as_str()))
        .cloned()
        .collect();

    if conflicts.is_empty() {
        Ok(())
    } else {
        conflicts.sort();
        conflicts.dedup();
        Err(SharePackError::Config(ConfigError::ConflictingMembership {
            owner: owner.to_string(),
            field: field.to_string(),
            values: conflicts,
        }))
    }
}

/// Checks whether a name is a valid resource name.
///
/// Names must be lowercase alphanumeric with single hyphens, starting with a
/// letter and not ending with a hyphen.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    if !name.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
        return false;
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return false;
    }

    if name.ends_with('-') {
        return false;
    }

    if name.contains("--") {
        return false;
    }

    true
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::PackMetadata;

    fn metadata(strategy: Strategy) -> PackMetadata {
        PackMetadata {
            name: String::from("sales-pack"),
            workspace: String::from("analytics"),
            strategy,
            catalog: None,
            schema: None,
            owner: None,
            description: None,
        }
    }

    fn share(name: &str) -> ShareSpec {
        ShareSpec {
            name: name.to_string(),
            description: None,
            assets: vec![],
            assets_to_add: vec![],
            assets_to_remove: vec![],
            recipients: vec![],
            recipients_to_add: vec![],
            recipients_to_remove: vec![],
            pipelines: vec![],
        }
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("sales-pack"));
        assert!(is_valid_name("pack-123"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Sales-Pack")); // uppercase
        assert!(!is_valid_name("123-pack")); // starts with number
        assert!(!is_valid_name("pack_one")); // underscore
        assert!(!is_valid_name("pack-")); // ends with hyphen
        assert!(!is_valid_name("pack--one")); // consecutive hyphens
    }

    #[test]
    fn test_conflicting_add_and_remove_names_the_value() {
        let mut s = share("sales");
        s.assets_to_add = vec![String::from("t1")];
        s.assets_to_remove = vec![String::from("t1")];

        let config = SharePackConfig {
            metadata: metadata(Strategy::Update),
            recipients: vec![],
            shares: vec![s],
        };

        let err = PackValidator::new()
            .validate(&config)
            .expect_err("conflict must fail validation");
        let message = err.to_string();
        assert!(message.contains("t1"), "error must name t1: {message}");
    }

    #[test]
    fn test_declarative_and_remove_conflict() {
        let mut s = share("sales");
        s.assets = vec![String::from("t1"), String::from("t2")];
        s.assets_to_remove = vec![String::from("t2")];

        let config = SharePackConfig {
            metadata: metadata(Strategy::Update),
            recipients: vec![],
            shares: vec![s],
        };

        assert!(PackValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_delete_strategy_accepts_name_only_pipelines() {
        let mut s = share("sales");
        s.pipelines = vec![PipelineSpec {
            name: String::from("orders-scd2"),
            source_table: None,
            target_table: None,
            scd_type: None,
            schedule: None,
            description: None,
        }];

        let config = SharePackConfig {
            metadata: metadata(Strategy::Delete),
            recipients: vec![],
            shares: vec![s],
        };

        let result = PackValidator::new()
            .validate(&config)
            .expect("name-only shape is valid under DELETE");
        assert!(result.is_valid());
    }

    #[test]
    fn test_converge_requires_full_pipeline_shape() {
        let mut s = share("sales");
        s.pipelines = vec![PipelineSpec {
            name: String::from("orders-scd2"),
            source_table: None,
            target_table: None,
            scd_type: None,
            schedule: None,
            description: None,
        }];

        let config = SharePackConfig {
            metadata: metadata(Strategy::New),
            recipients: vec![],
            shares: vec![s],
        };

        assert!(PackValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_share_rejected() {
        let config = SharePackConfig {
            metadata: metadata(Strategy::Update),
            recipients: vec![],
            shares: vec![share("sales"), share("sales")],
        };

        assert!(PackValidator::new().validate(&config).is_err());
    }
}
