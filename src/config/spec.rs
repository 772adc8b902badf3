//! Share-pack document types.
//!
//! This module defines the structs that map to a share-pack YAML/JSON
//! document. These types are declarative: they fully describe the desired
//! state of the recipients, shares, and pipelines the pack owns, and are
//! immutable once read for a given run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The root structure of a share-pack document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SharePackConfig {
    /// Pack-level metadata.
    pub metadata: PackMetadata,
    /// Recipients to converge or tear down.
    #[serde(default)]
    pub recipients: Vec<RecipientSpec>,
    /// Shares to converge or tear down.
    #[serde(default)]
    pub shares: Vec<ShareSpec>,
}

/// Pack-level metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackMetadata {
    /// Unique name for the pack.
    pub name: String,
    /// Target workspace on the sharing platform.
    pub workspace: String,
    /// Provisioning strategy.
    pub strategy: Strategy,
    /// Catalog scoping remote pipeline searches.
    #[serde(default)]
    pub catalog: Option<String>,
    /// Schema scoping remote pipeline searches.
    #[serde(default)]
    pub schema: Option<String>,
    /// Owner recorded on persisted versions.
    #[serde(default)]
    pub owner: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Provisioning strategy for a pack.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Strategy {
    /// Create resources that do not exist yet.
    New,
    /// Converge existing resources toward the desired state.
    Update,
    /// Tear down the named resources.
    Delete,
}

/// Desired state of a single recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientSpec {
    /// Unique recipient name.
    pub name: String,
    /// Recipient kind. Immutable after creation.
    #[serde(default)]
    pub kind: RecipientKind,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Full declarative IP access list.
    #[serde(default)]
    pub ip_access_list: Vec<String>,
}

/// Recipient kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecipientKind {
    /// Token-authenticated external recipient.
    #[default]
    Token,
    /// Platform-to-platform recipient identified by a sharing org.
    D2d {
        /// Sharing organization identifier. Immutable after creation.
        sharing_org_id: String,
    },
}

/// Desired state of a single share.
///
/// Membership can be expressed declaratively (`assets` / `recipients` are the
/// complete desired sets) or incrementally (`*_to_add` / `*_to_remove`).
/// Omitting every membership field leaves membership untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShareSpec {
    /// Unique share name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Full declarative asset membership.
    #[serde(default)]
    pub assets: Vec<String>,
    /// Assets to add (incremental mode).
    #[serde(default)]
    pub assets_to_add: Vec<String>,
    /// Assets to remove (incremental mode).
    #[serde(default)]
    pub assets_to_remove: Vec<String>,
    /// Full declarative recipient membership.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Recipients to grant (incremental mode).
    #[serde(default)]
    pub recipients_to_add: Vec<String>,
    /// Recipients to revoke (incremental mode).
    #[serde(default)]
    pub recipients_to_remove: Vec<String>,
    /// Pipelines feeding this share's assets.
    #[serde(default)]
    pub pipelines: Vec<PipelineSpec>,
}

/// Desired state of a single pipeline.
///
/// Under the DELETE strategy only `name` is required; the converge strategies
/// require source, target, and SCD type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineSpec {
    /// Unique pipeline name.
    pub name: String,
    /// Fully qualified source table. Immutable after creation.
    #[serde(default)]
    pub source_table: Option<String>,
    /// Fully qualified target table (the shared asset). Immutable after creation.
    #[serde(default)]
    pub target_table: Option<String>,
    /// Slowly-changing-dimension type. Immutable after creation.
    #[serde(default)]
    pub scd_type: Option<ScdType>,
    /// Desired schedule. `None` leaves the schedule untouched.
    #[serde(default)]
    pub schedule: Option<Schedule>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Slowly-changing-dimension types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScdType {
    /// SCD type 1 (overwrite).
    Type1,
    /// SCD type 2 (append versions).
    Type2,
}

/// Desired pipeline schedule, validated once at parse time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Schedule {
    /// Cron-triggered runs.
    Cron {
        /// Quartz cron expression.
        expr: String,
        /// IANA timezone for the expression.
        #[serde(default = "default_timezone")]
        timezone: String,
    },
    /// Continuous processing, no trigger.
    Continuous,
    /// Remove any existing schedule.
    Remove,
}

fn default_timezone() -> String {
    String::from("UTC")
}

/// Collects a string slice into an ordered set.
#[must_use]
pub fn to_set(values: &[String]) -> BTreeSet<String> {
    values.iter().cloned().collect()
}

impl SharePackConfig {
    /// Returns the names of every share in the pack.
    #[must_use]
    pub fn share_names(&self) -> Vec<&str> {
        self.shares.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the names of every recipient in the pack.
    #[must_use]
    pub fn recipient_names(&self) -> Vec<&str> {
        self.recipients.iter().map(|r| r.name.as_str()).collect()
    }

    /// Returns the total number of pipelines across all shares.
    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.shares.iter().map(|s| s.pipelines.len()).sum()
    }
}

impl ShareSpec {
    /// Returns true if any asset membership field is populated.
    #[must_use]
    pub fn touches_assets(&self) -> bool {
        !self.assets.is_empty()
            || !self.assets_to_add.is_empty()
            || !self.assets_to_remove.is_empty()
    }

    /// Returns true if any recipient membership field is populated.
    #[must_use]
    pub fn touches_recipients(&self) -> bool {
        !self.recipients.is_empty()
            || !self.recipients_to_add.is_empty()
            || !self.recipients_to_remove.is_empty()
    }

    /// Returns the names of this share's pipelines.
    #[must_use]
    pub fn pipeline_names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name.as_str()).collect()
    }
}

impl RecipientKind {
    /// Returns the sharing org id for D2D recipients.
    #[must_use]
    pub fn sharing_org_id(&self) -> Option<&str> {
        match self {
            Self::Token => None,
            Self::D2d { sharing_org_id } => Some(sharing_org_id),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ScdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Type1 => "type1",
            Self::Type2 => "type2",
        };
        write!(f, "{s}")
    }
}
