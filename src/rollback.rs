//! Compensation for partially applied runs.
//!
//! Every remote mutation a converge run performs is logged as a
//! [`RollbackEntry`]. When a later step in the same run fails, the
//! [`RollbackManager`] replays the log in reverse: created resources are
//! deleted, updated resources are driven back to their captured prior state.
//! Compensation is best effort, bounded by a wall-clock budget, and never
//! aborts on a failing step.

use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::diff::DiffEngine;
use crate::error::Result;
use crate::reconcile::ResourceKind;
use crate::remote::{RemoteContext, ScheduleState};

/// Wall-clock budget for one compensation pass.
pub const ROLLBACK_BUDGET_SECS: u64 = 120;

/// One undoable mutation, recorded immediately after it succeeded.
#[derive(Debug, Clone)]
pub enum RollbackEntry {
    /// A resource the run created. Undo is deletion.
    Created {
        /// Resource type.
        kind: ResourceKind,
        /// Resource name.
        name: String,
        /// Platform-assigned identifier.
        id: String,
    },
    /// A resource the run modified. Undo restores the captured prior state.
    Updated {
        /// Resource name.
        name: String,
        /// Platform-assigned identifier.
        id: String,
        /// State before the run touched the resource.
        prior: PriorState,
    },
}

/// A resource's state as observed before the run mutated it.
#[derive(Debug, Clone)]
pub enum PriorState {
    /// Prior recipient state.
    Recipient {
        /// Description before the run.
        description: Option<String>,
        /// IP access list before the run.
        ip_access_list: BTreeSet<String>,
    },
    /// Prior share state.
    Share {
        /// Description before the run.
        description: Option<String>,
        /// Asset membership before the run.
        assets: BTreeSet<String>,
        /// Recipient membership before the run.
        recipients: BTreeSet<String>,
    },
    /// Prior pipeline state.
    Pipeline {
        /// Description before the run.
        description: Option<String>,
        /// Schedule before the run, `None` if the pipeline was unscheduled.
        schedule: Option<ScheduleState>,
    },
}

/// A compensation step that could not be completed.
#[derive(Debug, Clone)]
pub struct RollbackFailure {
    /// Name of the resource whose undo failed.
    pub name: String,
    /// Why the undo failed.
    pub reason: String,
}

/// Outcome of one compensation pass.
#[derive(Debug, Clone, Default)]
pub struct RollbackReport {
    /// Number of entries in the log.
    pub total: usize,
    /// Entries successfully undone.
    pub undone: usize,
    /// Entries whose undo failed.
    pub failures: Vec<RollbackFailure>,
    /// True if the budget elapsed before the log was drained.
    pub timed_out: bool,
}

impl RollbackReport {
    /// Returns true if every entry was undone.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.timed_out && self.failures.is_empty() && self.undone == self.total
    }
}

/// Replays a run's compensation log.
#[derive(Debug)]
pub struct RollbackManager {
    remote: RemoteContext,
    diff: DiffEngine,
    budget: Duration,
}

impl RollbackManager {
    /// Creates a manager with the default budget.
    #[must_use]
    pub fn new(remote: RemoteContext) -> Self {
        Self {
            remote,
            diff: DiffEngine::new(),
            budget: Duration::from_secs(ROLLBACK_BUDGET_SECS),
        }
    }

    /// Overrides the compensation budget.
    #[must_use]
    pub const fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Undoes the logged mutations in reverse order.
    ///
    /// A failing step is recorded and the pass continues with the next entry.
    /// When the budget elapses the remaining entries are abandoned and the
    /// report is marked timed out.
    pub async fn rollback(&self, entries: Vec<RollbackEntry>) -> RollbackReport {
        let mut report = RollbackReport {
            total: entries.len(),
            ..RollbackReport::default()
        };
        if entries.is_empty() {
            return report;
        }

        info!("Rolling back {} mutation(s)", entries.len());

        let pass = tokio::time::timeout(self.budget, async {
            for entry in entries.iter().rev() {
                match self.undo(entry).await {
                    Ok(()) => report.undone += 1,
                    Err(e) => {
                        let name = entry_name(entry);
                        error!("Failed to roll back '{name}': {e}");
                        report.failures.push(RollbackFailure {
                            name: name.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        })
        .await;

        if pass.is_err() {
            report.timed_out = true;
            warn!(
                "Rollback budget of {}s elapsed with {} entries remaining",
                self.budget.as_secs(),
                report.total - report.undone - report.failures.len()
            );
        }

        if report.is_complete() {
            info!("Rollback complete: {} mutation(s) undone", report.undone);
        }
        report
    }

    async fn undo(&self, entry: &RollbackEntry) -> Result<()> {
        match entry {
            RollbackEntry::Created { kind, name, id } => {
                debug!("Undoing create of {kind} '{name}'");
                self.undo_create(*kind, id).await
            }
            RollbackEntry::Updated { name, id, prior } => {
                debug!("Restoring prior state of '{name}'");
                self.undo_update(name, id, prior).await
            }
        }
    }

    async fn undo_create(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let result = match kind {
            ResourceKind::Recipient => self.remote.recipients.delete(id).await,
            ResourceKind::Share => self.remote.shares.delete(id).await,
            ResourceKind::Pipeline => {
                if let Some(schedule) = self.remote.schedules.get_for_pipeline(id).await? {
                    self.remote.schedules.delete(&schedule.id).await?;
                }
                self.remote.pipelines.delete(id).await
            }
            ResourceKind::Schedule => self.remote.schedules.delete(id).await,
        };
        // Already gone counts as undone.
        match result {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    async fn undo_update(&self, name: &str, id: &str, prior: &PriorState) -> Result<()> {
        match prior {
            PriorState::Recipient {
                description,
                ip_access_list,
            } => {
                let Some(current) = self.remote.recipients.get(name).await? else {
                    return Ok(());
                };
                let back = self
                    .diff
                    .toward(name, "ip_access_list", ip_access_list, &current.ip_access_list);
                if !back.add.is_empty() {
                    self.remote.recipients.add_ip_addresses(id, &back.add).await?;
                }
                if !back.remove.is_empty() {
                    self.remote
                        .recipients
                        .remove_ip_addresses(id, &back.remove)
                        .await?;
                }
                if current.description != *description {
                    self.remote
                        .recipients
                        .set_description(id, description.as_deref())
                        .await?;
                }
                Ok(())
            }
            PriorState::Share {
                description,
                assets,
                recipients,
            } => {
                let Some(current) = self.remote.shares.get(name).await? else {
                    return Ok(());
                };
                let asset_back = self.diff.toward(name, "assets", assets, &current.assets);
                if !asset_back.add.is_empty() {
                    self.remote.shares.add_assets(id, &asset_back.add).await?;
                }
                if !asset_back.remove.is_empty() {
                    self.remote.shares.remove_assets(id, &asset_back.remove).await?;
                }
                let recipient_back =
                    self.diff.toward(name, "recipients", recipients, &current.recipients);
                if !recipient_back.add.is_empty() {
                    self.remote
                        .shares
                        .grant_recipients(id, &recipient_back.add)
                        .await?;
                }
                if !recipient_back.remove.is_empty() {
                    self.remote
                        .shares
                        .revoke_recipients(id, &recipient_back.remove)
                        .await?;
                }
                if current.description != *description {
                    self.remote
                        .shares
                        .set_description(id, description.as_deref())
                        .await?;
                }
                Ok(())
            }
            PriorState::Pipeline {
                description,
                schedule,
            } => {
                let Some(current) = self.remote.pipelines.get(name).await? else {
                    return Ok(());
                };
                if current.description != *description {
                    self.remote
                        .pipelines
                        .set_description(id, description.as_deref())
                        .await?;
                }
                let current_schedule = self.remote.schedules.get_for_pipeline(id).await?;
                match (current_schedule, schedule) {
                    (Some(existing), None) => self.remote.schedules.delete(&existing.id).await,
                    (Some(existing), Some(prior_state)) => {
                        if existing.state == *prior_state {
                            Ok(())
                        } else {
                            self.remote.schedules.update(&existing.id, prior_state).await
                        }
                    }
                    (None, Some(prior_state)) => self
                        .remote
                        .schedules
                        .create(id, prior_state)
                        .await
                        .map(|_| ()),
                    (None, None) => Ok(()),
                }
            }
        }
    }
}

fn entry_name(entry: &RollbackEntry) -> &str {
    match entry {
        RollbackEntry::Created { name, .. } | RollbackEntry::Updated { name, .. } => name,
    }
}
