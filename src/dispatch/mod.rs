//! Strategy dispatch.
//!
//! The provisioner owns one run end to end: validate the pack, route it to
//! the converge path (NEW, UPDATE) or the teardown path (DELETE), compensate
//! on failure, and persist on success. The flows themselves live in the
//! child modules; everything here is run plumbing.

mod converge;
mod teardown;

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{PackValidator, SharePackConfig, Strategy};
use crate::error::Result;
use crate::persist::{PersistReport, PersistenceWriter, Repositories};
use crate::reconcile::{
    EnsureReport, PipelineReconciler, RecipientReconciler, RunContext, ShareReconciler,
};
use crate::remote::RemoteContext;
use crate::rollback::{RollbackManager, RollbackReport};
use crate::status::{RunState, RunStatus, StatusSink, StatusTracker, TracingStatusSink};

/// Drives provisioning runs against one platform and one state store.
pub struct Provisioner {
    remote: RemoteContext,
    repos: Repositories,
    recipients: RecipientReconciler,
    shares: ShareReconciler,
    pipelines: PipelineReconciler,
    rollback: RollbackManager,
    writer: PersistenceWriter,
    validator: PackValidator,
    sinks: Vec<Arc<dyn StatusSink>>,
}

/// The result of one provisioning run.
#[derive(Debug)]
pub struct ProvisionOutcome {
    /// Full run status including steps and warnings.
    pub status: RunStatus,
    /// What was persisted, if the writer ran.
    pub persist: Option<PersistReport>,
    /// Compensation report, if the run was rolled back.
    pub rollback: Option<RollbackReport>,
    /// The error that ended the run, if it failed.
    pub error: Option<String>,
}

impl ProvisionOutcome {
    /// True if the run converged and persisted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status.state, RunState::Succeeded)
    }
}

impl Provisioner {
    /// Creates a provisioner over the given platform and stores.
    #[must_use]
    pub fn new(remote: RemoteContext, repos: Repositories) -> Self {
        Self {
            recipients: RecipientReconciler::new(remote.clone()),
            shares: ShareReconciler::new(remote.clone()),
            pipelines: PipelineReconciler::new(remote.clone()),
            rollback: RollbackManager::new(remote.clone()),
            writer: PersistenceWriter::new(repos.clone()),
            validator: PackValidator::new(),
            repos,
            remote,
            sinks: vec![Arc::new(TracingStatusSink)],
        }
    }

    /// Adds a status sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Executes one run of the pack.
    ///
    /// Configuration errors fail fast and are returned as `Err` before any
    /// remote call. Once the run is underway, failures are folded into the
    /// returned outcome: converge failures are compensated, teardown
    /// failures keep whatever was already removed on record.
    pub async fn provision(&self, pack: &SharePackConfig) -> Result<ProvisionOutcome> {
        let validation = self.validator.validate(pack)?;

        let mut ctx = RunContext::new(&pack.metadata.name, pack.metadata.strategy);
        let mut tracker = StatusTracker::new(ctx.run_id, &pack.metadata.name, ctx.strategy);
        for sink in &self.sinks {
            tracker = tracker.with_sink(Arc::clone(sink));
        }
        for warning in validation.warnings {
            tracker.record_warning(warning);
        }

        info!(
            "Provisioning pack '{}' (run {}, strategy {})",
            pack.metadata.name, ctx.run_id, ctx.strategy
        );

        let result = match pack.metadata.strategy {
            Strategy::New | Strategy::Update => self.converge(pack, &mut ctx, &mut tracker).await,
            Strategy::Delete => self.teardown(pack, &mut ctx, &mut tracker).await,
        };

        for warning in ctx.warnings().to_vec() {
            tracker.record_warning(warning);
        }

        match result {
            Ok(()) => {
                let persist = self.flush(&mut ctx, &mut tracker);
                if ctx.strategy == Strategy::Delete {
                    info!("Pack '{}' torn down", pack.metadata.name);
                } else if ctx.rollback_entries().is_empty() {
                    info!(
                        "Pack '{}' already converged; no changes were needed",
                        pack.metadata.name
                    );
                } else {
                    info!("Pack '{}' provisioned", pack.metadata.name);
                }
                tracker.finish(RunState::Succeeded);
                Ok(ProvisionOutcome {
                    status: tracker.into_status(),
                    persist,
                    rollback: None,
                    error: None,
                })
            }
            Err(e) => {
                match tracker.last_label() {
                    Some(label) => error!("Run failed after step '{label}': {e}"),
                    None => error!("Run failed: {e}"),
                }

                let entries = ctx.take_rollback();
                let (state, rollback) = if entries.is_empty() {
                    (RunState::Failed, None)
                } else {
                    warn!("Compensating {} mutation(s)", entries.len());
                    let report = self.rollback.rollback(entries).await;
                    let state = if report.is_complete() {
                        RunState::RolledBack
                    } else {
                        RunState::PartiallyRolledBack
                    };
                    (state, Some(report))
                };

                // Teardown deletes are not compensated; keep what already
                // happened on record even though the run failed.
                let persist = if ctx.strategy == Strategy::Delete {
                    self.flush(&mut ctx, &mut tracker)
                } else {
                    None
                };

                tracker.fail(state, e.to_string());
                Ok(ProvisionOutcome {
                    status: tracker.into_status(),
                    persist,
                    rollback,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    fn flush(&self, ctx: &mut RunContext, tracker: &mut StatusTracker) -> Option<PersistReport> {
        match self.writer.flush(ctx) {
            Ok(report) => Some(report),
            Err(e) => {
                // The platform already converged; state will catch up on the
                // next run.
                error!("Failed to persist run state: {e}");
                tracker.record_warning(format!("run state was not persisted: {e}"));
                None
            }
        }
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

fn describe(report: &EnsureReport) -> String {
    if report.changes.is_empty() {
        report.outcome.to_string()
    } else {
        report.changes.join(", ")
    }
}
