//! The converge flow (NEW and UPDATE strategies).
//!
//! Recipients first, then each share. After a share's membership has moved,
//! pipelines feeding assets that left the share are torn down, then the
//! pack's own pipelines are reconciled, and finally every newly shared asset
//! must be fed by a pipeline, either one from the pack or one already on the
//! platform. An uncovered asset fails the run, which compensates everything
//! applied so far.
//!
//! Pipeline lookups consult the stored version records first; the scoped
//! platform search is only a fallback for assets nothing on record feeds.

use std::collections::BTreeSet;
use tracing::info;

use crate::config::{SharePackConfig, ShareSpec};
use crate::error::{ReconcileError, Result};
use crate::reconcile::{PersistEntry, ResourceKind, RunContext};
use crate::remote::RemotePipeline;
use crate::status::StatusTracker;

use super::{describe, Provisioner};

impl Provisioner {
    pub(super) async fn converge(
        &self,
        pack: &SharePackConfig,
        ctx: &mut RunContext,
        tracker: &mut StatusTracker,
    ) -> Result<()> {
        for spec in &pack.recipients {
            let report = self.recipients.ensure(spec, ctx).await?;
            tracker.record(format!("recipient/{}", report.name), describe(&report));
        }

        for share in &pack.shares {
            let ensure = self.shares.ensure(share, ctx).await?;
            tracker.record(
                format!("share/{}", ensure.report.name),
                describe(&ensure.report),
            );

            // Cleanup first: a pack pipeline targeting a just-removed asset
            // must not be created only to be torn down in the same run.
            self.teardown_dependents(share, &ensure.assets_removed, ctx, tracker)
                .await?;

            for pipeline in &share.pipelines {
                let report = self.pipelines.ensure(pipeline, &share.name, ctx).await?;
                tracker.record(format!("pipeline/{}", report.name), describe(&report));
            }

            self.require_coverage(share, &ensure.assets_added).await?;
        }

        Ok(())
    }

    /// Tears down pipelines whose target asset just left the share.
    ///
    /// These deletions are deliberate outcomes of the desired state, not run
    /// mutations to compensate, so no rollback entries are recorded.
    async fn teardown_dependents(
        &self,
        share: &ShareSpec,
        removed: &BTreeSet<String>,
        ctx: &mut RunContext,
        tracker: &mut StatusTracker,
    ) -> Result<()> {
        for asset in removed {
            let stored = self.stored_feeders(asset)?;
            let feeders: Vec<RemotePipeline> = if stored.is_empty() {
                // Nothing on record feeds the asset; fall back to a scoped
                // platform search.
                let filter = self.remote.pipeline_filter(Some(asset));
                self.remote.pipelines.list(&filter).await?
            } else {
                let mut found = Vec::new();
                for name in &stored {
                    match self.remote.pipelines.get(name).await? {
                        Some(pipeline) => found.push(pipeline),
                        None => {
                            // Already gone remotely; close out the record.
                            ctx.record_persist(PersistEntry::Removed {
                                kind: ResourceKind::Pipeline,
                                name: name.clone(),
                                share_name: Some(share.name.clone()),
                                reason: format!("asset '{asset}' left the share"),
                            });
                        }
                    }
                }
                found
            };

            for pipeline in feeders {
                info!(
                    "Tearing down pipeline '{}': asset '{asset}' left share '{}'",
                    pipeline.name, share.name
                );
                if let Some(schedule) =
                    self.remote.schedules.get_for_pipeline(&pipeline.id).await?
                {
                    self.remote.schedules.delete(&schedule.id).await?;
                }
                self.remote.pipelines.delete(&pipeline.id).await?;

                ctx.record_persist(PersistEntry::Removed {
                    kind: ResourceKind::Pipeline,
                    name: pipeline.name.clone(),
                    share_name: Some(share.name.clone()),
                    reason: format!("asset '{asset}' left the share"),
                });
                tracker.record(
                    format!("pipeline/{}", pipeline.name),
                    format!("torn down, asset '{asset}' left the share"),
                );
            }
        }
        Ok(())
    }

    /// Fails the run if any newly shared asset has no pipeline feeding it.
    async fn require_coverage(&self, share: &ShareSpec, added: &BTreeSet<String>) -> Result<()> {
        let mut uncovered = Vec::new();
        for asset in added {
            let in_pack = share
                .pipelines
                .iter()
                .any(|p| p.target_table.as_deref() == Some(asset.as_str()));
            if in_pack {
                continue;
            }
            if !self.stored_feeders(asset)?.is_empty() {
                continue;
            }
            let filter = self.remote.pipeline_filter(Some(asset));
            if self.remote.pipelines.list(&filter).await?.is_empty() {
                uncovered.push(asset.clone());
            }
        }

        if uncovered.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::PipelineCoverage {
                share: share.name.clone(),
                assets: uncovered,
            }
            .into())
        }
    }

    /// Names of the live stored pipeline records feeding the asset.
    fn stored_feeders(&self, asset: &str) -> Result<Vec<String>> {
        let records = self.repos.pipelines.load()?;
        Ok(records
            .into_iter()
            .filter(|p| p.meta.is_live() && p.target_table.as_deref() == Some(asset))
            .map(|p| p.name)
            .collect())
    }
}
