//! Per-resource reconcilers.
//!
//! Each reconciler converges one resource type toward its spec: fetch the
//! remote state, create the resource if it is missing, reject immutable-field
//! changes, then apply the remaining deltas in a fixed order (description,
//! additions, removals, schedule). Every mutation is recorded in the
//! [`RunContext`] so a failing run can be compensated and a successful run
//! can be persisted.

mod pipeline;
mod recipient;
mod share;

pub use pipeline::PipelineReconciler;
pub use recipient::RecipientReconciler;
pub use share::{ShareEnsure, ShareReconciler};

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::config::{PipelineSpec, RecipientSpec, ShareSpec, Strategy};
use crate::rollback::RollbackEntry;

/// What a reconciler did to one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The resource did not exist and was created.
    Created,
    /// The resource existed and at least one delta was applied.
    Updated,
    /// The resource already matched its spec.
    Matching,
}

/// The resource types a run touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A data recipient.
    Recipient,
    /// A share.
    Share,
    /// A pipeline feeding a shared asset.
    Pipeline,
    /// A pipeline schedule.
    Schedule,
}

/// Mutable state threaded through one provisioning run.
///
/// Accumulates the compensation log, the persistence intents, and the
/// warnings a run produces. Owned by the dispatcher and passed by mutable
/// reference, so nothing about a run lives in shared or global state.
#[derive(Debug)]
pub struct RunContext {
    /// Unique identifier for this run.
    pub run_id: Uuid,
    /// Pack being provisioned.
    pub pack_name: String,
    /// Strategy the run executes.
    pub strategy: Strategy,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    rollback: Vec<RollbackEntry>,
    persist: Vec<PersistEntry>,
    warnings: Vec<String>,
}

impl RunContext {
    /// Creates a fresh context for one run.
    #[must_use]
    pub fn new(pack_name: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pack_name: pack_name.into(),
            strategy,
            started_at: Utc::now(),
            rollback: Vec::new(),
            persist: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Records a compensation entry for a mutation that just succeeded.
    pub fn record_rollback(&mut self, entry: RollbackEntry) {
        self.rollback.push(entry);
    }

    /// Records a persistence intent for a resource the run touched.
    pub fn record_persist(&mut self, entry: PersistEntry) {
        self.persist.push(entry);
    }

    /// Records a run-level warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// The compensation log, oldest first.
    #[must_use]
    pub fn rollback_entries(&self) -> &[RollbackEntry] {
        &self.rollback
    }

    /// The persistence intents recorded so far.
    #[must_use]
    pub fn persist_entries(&self) -> &[PersistEntry] {
        &self.persist
    }

    /// The warnings recorded so far.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Drains the compensation log for execution.
    pub fn take_rollback(&mut self) -> Vec<RollbackEntry> {
        std::mem::take(&mut self.rollback)
    }

    /// Drains the persistence intents for the writer.
    pub fn take_persist(&mut self) -> Vec<PersistEntry> {
        std::mem::take(&mut self.persist)
    }
}

/// What one reconciler invocation did.
#[derive(Debug, Clone)]
pub struct EnsureReport {
    /// Resource type.
    pub kind: ResourceKind,
    /// Resource name.
    pub name: String,
    /// Platform-assigned identifier.
    pub remote_id: String,
    /// Outcome of the invocation.
    pub outcome: EnsureOutcome,
    /// Human-readable deltas that were applied, in order.
    pub changes: Vec<String>,
}

impl EnsureReport {
    /// Creates a report for a resource that matched its spec.
    #[must_use]
    pub fn matching(kind: ResourceKind, name: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            remote_id: remote_id.into(),
            outcome: EnsureOutcome::Matching,
            changes: Vec::new(),
        }
    }
}

/// A persistence intent recorded during reconciliation.
///
/// The persistence writer consumes these after the remote platform has
/// converged, so a failed run never writes state.
#[derive(Debug, Clone)]
pub enum PersistEntry {
    /// A recipient the run created, updated, or confirmed.
    Recipient {
        /// Outcome of the reconciliation.
        outcome: EnsureOutcome,
        /// The spec that was converged.
        spec: RecipientSpec,
        /// The IP access list after convergence.
        resolved_ip: BTreeSet<String>,
    },
    /// A share the run created, updated, or confirmed.
    Share {
        /// Outcome of the reconciliation.
        outcome: EnsureOutcome,
        /// The spec that was converged.
        spec: ShareSpec,
        /// Asset membership after convergence.
        resolved_assets: BTreeSet<String>,
        /// Recipient membership after convergence.
        resolved_recipients: BTreeSet<String>,
    },
    /// A pipeline the run created, updated, or confirmed.
    Pipeline {
        /// Outcome of the reconciliation.
        outcome: EnsureOutcome,
        /// The spec that was converged.
        spec: PipelineSpec,
        /// The share this pipeline feeds.
        share_name: String,
    },
    /// A resource the run removed from the platform.
    Removed {
        /// Resource type.
        kind: ResourceKind,
        /// Resource name.
        name: String,
        /// Owning share, for pipelines.
        share_name: Option<String>,
        /// Why it was removed.
        reason: String,
    },
}

impl std::fmt::Display for EnsureOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Matching => "matching",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Recipient => "recipient",
            Self::Share => "share",
            Self::Pipeline => "pipeline",
            Self::Schedule => "schedule",
        };
        write!(f, "{s}")
    }
}
