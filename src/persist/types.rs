//! Persisted record types.
//!
//! State is stored as an append-only version history per entity (SCD type 2):
//! every change closes the current version and appends a new one. Removal is
//! a soft delete, expressed as a new current version carrying the deleted
//! marker, so history survives teardown. A recreated resource gets a fresh
//! entity id; it is a new entity that happens to reuse a name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::config::{RecipientKind, ScdType, Schedule};

/// Version bookkeeping shared by every persisted record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionMeta {
    /// Stable identity across versions of one entity.
    pub entity_id: Uuid,
    /// Version number, starting at 1.
    pub version: u32,
    /// When this version became current.
    pub valid_from: DateTime<Utc>,
    /// When this version was superseded. `None` while current.
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
    /// True for the single newest version of the entity.
    pub is_current: bool,
    /// True if this version records a removal.
    #[serde(default)]
    pub is_deleted: bool,
    /// Run that wrote this version.
    pub run_id: Uuid,
    /// Pack that owned the run.
    pub pack_name: String,
    /// Why the resource was removed. Only set on deleted markers.
    #[serde(default)]
    pub deletion_reason: Option<String>,
}

impl VersionMeta {
    /// Creates the first version of a new entity.
    #[must_use]
    pub fn first(run_id: Uuid, pack_name: impl Into<String>) -> Self {
        Self {
            entity_id: Uuid::new_v4(),
            version: 1,
            valid_from: Utc::now(),
            valid_to: None,
            is_current: true,
            is_deleted: false,
            run_id,
            pack_name: pack_name.into(),
            deletion_reason: None,
        }
    }

    /// Creates the successor of this version.
    #[must_use]
    pub fn next(&self, run_id: Uuid) -> Self {
        Self {
            entity_id: self.entity_id,
            version: self.version + 1,
            valid_from: Utc::now(),
            valid_to: None,
            is_current: true,
            is_deleted: false,
            run_id,
            pack_name: self.pack_name.clone(),
            deletion_reason: None,
        }
    }

    /// True for the current, not-deleted version of an entity.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.is_current && !self.is_deleted
    }
}

/// A record type stored in a version log.
pub trait VersionedRecord: Clone + Send + Sync {
    /// Version bookkeeping.
    fn meta(&self) -> &VersionMeta;
    /// Mutable version bookkeeping.
    fn meta_mut(&mut self) -> &mut VersionMeta;
    /// The record's name, the join key to the share-pack document.
    fn name(&self) -> &str;
}

/// A stored recipient version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedRecipient {
    /// Version bookkeeping.
    pub meta: VersionMeta,
    /// Recipient name.
    pub name: String,
    /// Recipient kind.
    pub kind: RecipientKind,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// IP access list after convergence.
    #[serde(default)]
    pub ip_access_list: BTreeSet<String>,
}

/// A stored share version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedShare {
    /// Version bookkeeping.
    pub meta: VersionMeta,
    /// Share name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Asset membership after convergence.
    #[serde(default)]
    pub assets: BTreeSet<String>,
    /// Recipient membership after convergence.
    #[serde(default)]
    pub recipients: BTreeSet<String>,
}

/// A stored pipeline version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedPipeline {
    /// Version bookkeeping.
    pub meta: VersionMeta,
    /// Pipeline name.
    pub name: String,
    /// Name of the share this pipeline feeds.
    pub share_name: String,
    /// Entity id of that share's stored record. Corrected by the propagation
    /// pass when the share is recreated under a new entity id.
    #[serde(default)]
    pub share_id: Option<Uuid>,
    /// Fully qualified source table.
    #[serde(default)]
    pub source_table: Option<String>,
    /// Fully qualified target table.
    #[serde(default)]
    pub target_table: Option<String>,
    /// Slowly-changing-dimension type.
    #[serde(default)]
    pub scd_type: Option<ScdType>,
    /// Desired schedule at the time of the run.
    #[serde(default)]
    pub schedule: Option<Schedule>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

macro_rules! impl_versioned {
    ($ty:ty) => {
        impl VersionedRecord for $ty {
            fn meta(&self) -> &VersionMeta {
                &self.meta
            }
            fn meta_mut(&mut self) -> &mut VersionMeta {
                &mut self.meta
            }
            fn name(&self) -> &str {
                &self.name
            }
        }
    };
}

impl_versioned!(PersistedRecipient);
impl_versioned!(PersistedShare);
impl_versioned!(PersistedPipeline);
