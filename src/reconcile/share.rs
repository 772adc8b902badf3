//! Share reconciliation.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::config::{to_set, ShareSpec};
use crate::diff::{DiffEngine, MembershipDiff};
use crate::error::Result;
use crate::remote::{CreateShareRequest, RemoteContext, RemoteShare};
use crate::rollback::{PriorState, RollbackEntry};

use super::{EnsureOutcome, EnsureReport, PersistEntry, ResourceKind, RunContext};

/// Converges shares toward their spec.
#[derive(Debug)]
pub struct ShareReconciler {
    remote: RemoteContext,
    diff: DiffEngine,
}

/// Outcome of one share reconciliation.
///
/// The asset deltas are surfaced so the dispatcher can require pipeline
/// coverage for newly shared assets and tear down pipelines feeding assets
/// that left the share.
#[derive(Debug, Clone)]
pub struct ShareEnsure {
    /// What the reconciler did.
    pub report: EnsureReport,
    /// Assets this run added to the share.
    pub assets_added: BTreeSet<String>,
    /// Assets this run removed from the share.
    pub assets_removed: BTreeSet<String>,
}

impl ShareReconciler {
    /// Creates a reconciler operating against the given platform.
    #[must_use]
    pub fn new(remote: RemoteContext) -> Self {
        Self {
            remote,
            diff: DiffEngine::new(),
        }
    }

    /// Ensures the share exists and matches its spec.
    ///
    /// Creation yields an empty share; membership is then converged through
    /// the same delta path an existing share takes, so both paths share one
    /// ordering: description, asset additions, asset removals, grants,
    /// revocations.
    pub async fn ensure(&self, spec: &ShareSpec, ctx: &mut RunContext) -> Result<ShareEnsure> {
        let existing = self.remote.shares.get(&spec.name).await?;

        let (existing, created) = match existing {
            Some(existing) => (existing, false),
            None => match self.create(spec, ctx).await {
                Ok(created) => (created, true),
                Err(e) if e.is_already_exists() => {
                    debug!("Share '{}' appeared concurrently, re-fetching", spec.name);
                    (self.remote.shares.get(&spec.name).await?.ok_or(e)?, false)
                }
                Err(e) => return Err(e),
            },
        };

        self.converge(spec, existing, created, ctx).await
    }

    async fn create(&self, spec: &ShareSpec, ctx: &mut RunContext) -> Result<RemoteShare> {
        info!("Creating share '{}'", spec.name);
        let request = CreateShareRequest {
            name: spec.name.clone(),
            description: spec.description.clone(),
        };
        let created = self.remote.shares.create(&request).await?;

        ctx.record_rollback(RollbackEntry::Created {
            kind: ResourceKind::Share,
            name: created.name.clone(),
            id: created.id.clone(),
        });
        Ok(created)
    }

    async fn converge(
        &self,
        spec: &ShareSpec,
        existing: RemoteShare,
        created: bool,
        ctx: &mut RunContext,
    ) -> Result<ShareEnsure> {
        let prior = PriorState::Share {
            description: existing.description.clone(),
            assets: existing.assets.clone(),
            recipients: existing.recipients.clone(),
        };
        let mut changes = Vec::new();

        let asset_diff = self.membership_diff(
            spec,
            "assets",
            &spec.assets,
            &spec.assets_to_add,
            &spec.assets_to_remove,
            &existing.assets,
        );
        let recipient_diff = self.membership_diff(
            spec,
            "recipients",
            &spec.recipients,
            &spec.recipients_to_add,
            &spec.recipients_to_remove,
            &existing.recipients,
        );
        let resolved_assets = asset_diff.apply_to(&existing.assets);
        let resolved_recipients = recipient_diff.apply_to(&existing.recipients);

        if !created
            && let Some(description) = &spec.description
            && existing.description.as_deref() != Some(description)
        {
            self.remote
                .shares
                .set_description(&existing.id, Some(description))
                .await?;
            changes.push(String::from("set description"));
            self.record_update(&existing, &prior, &changes, created, ctx);
        }

        if !asset_diff.add.is_empty() {
            self.remote
                .shares
                .add_assets(&existing.id, &asset_diff.add)
                .await?;
            changes.push(format!("added {} asset(s)", asset_diff.add.len()));
            self.record_update(&existing, &prior, &changes, created, ctx);
        }
        if !asset_diff.remove.is_empty() {
            self.remote
                .shares
                .remove_assets(&existing.id, &asset_diff.remove)
                .await?;
            changes.push(format!("removed {} asset(s)", asset_diff.remove.len()));
            self.record_update(&existing, &prior, &changes, created, ctx);
        }
        if !recipient_diff.add.is_empty() {
            self.remote
                .shares
                .grant_recipients(&existing.id, &recipient_diff.add)
                .await?;
            changes.push(format!("granted {} recipient(s)", recipient_diff.add.len()));
            self.record_update(&existing, &prior, &changes, created, ctx);
        }
        if !recipient_diff.remove.is_empty() {
            self.remote
                .shares
                .revoke_recipients(&existing.id, &recipient_diff.remove)
                .await?;
            changes.push(format!("revoked {} recipient(s)", recipient_diff.remove.len()));
            self.record_update(&existing, &prior, &changes, created, ctx);
        }

        let outcome = if created {
            EnsureOutcome::Created
        } else if changes.is_empty() {
            debug!("Share '{}' already matches its spec", spec.name);
            EnsureOutcome::Matching
        } else {
            info!("Updated share '{}': {}", spec.name, changes.join(", "));
            EnsureOutcome::Updated
        };

        ctx.record_persist(PersistEntry::Share {
            outcome,
            spec: spec.clone(),
            resolved_assets,
            resolved_recipients,
        });

        let mut report = EnsureReport {
            kind: ResourceKind::Share,
            name: existing.name,
            remote_id: existing.id,
            outcome,
            changes,
        };
        if created {
            report.changes.insert(0, String::from("created"));
        }

        Ok(ShareEnsure {
            report,
            assets_added: asset_diff.add,
            assets_removed: asset_diff.remove,
        })
    }

    fn membership_diff(
        &self,
        spec: &ShareSpec,
        field: &str,
        full: &[String],
        to_add: &[String],
        to_remove: &[String],
        current: &BTreeSet<String>,
    ) -> MembershipDiff {
        self.diff.diff(
            &spec.name,
            field,
            &to_set(full),
            &to_set(to_add),
            &to_set(to_remove),
            current,
        )
    }

    /// Records the compensation entry once, on the first applied delta.
    /// A freshly created share is already covered by its create entry.
    fn record_update(
        &self,
        existing: &RemoteShare,
        prior: &PriorState,
        changes: &[String],
        created: bool,
        ctx: &mut RunContext,
    ) {
        if !created && changes.len() == 1 {
            ctx.record_rollback(RollbackEntry::Updated {
                name: existing.name.clone(),
                id: existing.id.clone(),
                prior: prior.clone(),
            });
        }
    }
}
