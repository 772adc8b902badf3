//! Remote sharing-platform resource types.
//!
//! These types represent the platform's authoritative current state. They
//! are fetched fresh for every run and never cached across runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::{RecipientKind, RecipientSpec, ScdType, Schedule};

/// A recipient as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteRecipient {
    /// Platform-assigned identifier.
    pub id: String,
    /// Recipient name (the join key to the share pack).
    pub name: String,
    /// Authentication kind. Immutable on the platform.
    pub authentication: AuthenticationKind,
    /// Sharing org for D2D recipients. Immutable on the platform.
    #[serde(default)]
    pub sharing_org_id: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Allowed source addresses.
    #[serde(default)]
    pub ip_access_list: BTreeSet<String>,
}

/// Recipient authentication kinds on the platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthenticationKind {
    /// Bearer-token authentication.
    Token,
    /// Platform-to-platform authentication.
    D2d,
}

/// A share as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteShare {
    /// Platform-assigned identifier.
    pub id: String,
    /// Share name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Fully qualified names of the shared assets.
    #[serde(default)]
    pub assets: BTreeSet<String>,
    /// Names of the recipients granted access.
    #[serde(default)]
    pub recipients: BTreeSet<String>,
}

/// A pipeline as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemotePipeline {
    /// Platform-assigned identifier.
    pub id: String,
    /// Pipeline name.
    pub name: String,
    /// Fully qualified source table.
    pub source_table: String,
    /// Fully qualified target table.
    pub target_table: String,
    /// Slowly-changing-dimension type.
    pub scd_type: ScdType,
    /// Catalog the pipeline writes into.
    #[serde(default)]
    pub catalog: Option<String>,
    /// Schema the pipeline writes into.
    #[serde(default)]
    pub schema: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// A pipeline schedule as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteSchedule {
    /// Platform-assigned identifier.
    pub id: String,
    /// Identifier of the pipeline this schedule triggers.
    pub pipeline_id: String,
    /// Trigger definition.
    pub state: ScheduleState,
}

/// A concrete schedule state on the platform.
///
/// Unlike [`Schedule`], there is no `Remove` here: absence of a schedule is
/// represented by the schedule resource not existing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScheduleState {
    /// Cron-triggered runs.
    Cron {
        /// Quartz cron expression.
        expr: String,
        /// IANA timezone for the expression.
        timezone: String,
    },
    /// Continuous processing.
    Continuous,
}

/// Request body for creating a recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateRecipientRequest {
    /// Recipient name.
    pub name: String,
    /// Authentication kind.
    pub authentication: AuthenticationKind,
    /// Sharing org for D2D recipients.
    #[serde(default)]
    pub sharing_org_id: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Allowed source addresses.
    #[serde(default)]
    pub ip_access_list: BTreeSet<String>,
}

/// Request body for creating a share.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateShareRequest {
    /// Share name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Request body for creating a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatePipelineRequest {
    /// Pipeline name.
    pub name: String,
    /// Fully qualified source table.
    pub source_table: String,
    /// Fully qualified target table.
    pub target_table: String,
    /// Slowly-changing-dimension type.
    pub scd_type: ScdType,
    /// Catalog scoping the pipeline.
    #[serde(default)]
    pub catalog: Option<String>,
    /// Schema scoping the pipeline.
    #[serde(default)]
    pub schema: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Filter for listing pipelines.
///
/// `catalog` and `schema` scope the search so a target-table lookup cannot
/// match pipelines owned by another tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineFilter {
    /// Restrict to this catalog.
    #[serde(default)]
    pub catalog: Option<String>,
    /// Restrict to this schema.
    #[serde(default)]
    pub schema: Option<String>,
    /// Restrict to pipelines writing this target table.
    #[serde(default)]
    pub target_table: Option<String>,
}

impl CreateRecipientRequest {
    /// Builds a create request from a recipient spec.
    #[must_use]
    pub fn from_spec(spec: &RecipientSpec) -> Self {
        Self {
            name: spec.name.clone(),
            authentication: AuthenticationKind::from_kind(&spec.kind),
            sharing_org_id: spec.kind.sharing_org_id().map(String::from),
            description: spec.description.clone(),
            ip_access_list: spec.ip_access_list.iter().cloned().collect(),
        }
    }
}

impl AuthenticationKind {
    /// Maps a spec-side recipient kind onto the platform kind.
    #[must_use]
    pub const fn from_kind(kind: &RecipientKind) -> Self {
        match kind {
            RecipientKind::Token => Self::Token,
            RecipientKind::D2d { .. } => Self::D2d,
        }
    }
}

impl ScheduleState {
    /// Converts a desired schedule into a platform schedule state.
    ///
    /// Returns `None` for [`Schedule::Remove`], which maps to deleting the
    /// schedule resource.
    #[must_use]
    pub fn from_schedule(schedule: &Schedule) -> Option<Self> {
        match schedule {
            Schedule::Cron { expr, timezone } => Some(Self::Cron {
                expr: expr.clone(),
                timezone: timezone.clone(),
            }),
            Schedule::Continuous => Some(Self::Continuous),
            Schedule::Remove => None,
        }
    }
}

impl std::fmt::Display for AuthenticationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Token => "TOKEN",
            Self::D2d => "D2D",
        };
        write!(f, "{s}")
    }
}
