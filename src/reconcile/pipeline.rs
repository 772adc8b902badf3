//! Pipeline and schedule reconciliation.

use tracing::{debug, info};

use crate::config::{PipelineSpec, Schedule};
use crate::error::{ConfigError, Result};
use crate::remote::{CreatePipelineRequest, RemoteContext, RemotePipeline, ScheduleState};
use crate::rollback::{PriorState, RollbackEntry};

use super::{EnsureOutcome, EnsureReport, PersistEntry, ResourceKind, RunContext};

/// Converges pipelines and their schedules toward their spec.
#[derive(Debug)]
pub struct PipelineReconciler {
    remote: RemoteContext,
}

impl PipelineReconciler {
    /// Creates a reconciler operating against the given platform.
    #[must_use]
    pub const fn new(remote: RemoteContext) -> Self {
        Self { remote }
    }

    /// Ensures the pipeline exists, matches its spec, and carries the desired
    /// schedule.
    ///
    /// `share_name` is the share whose asset this pipeline feeds; it travels
    /// with the persistence intent so stored pipeline versions reference
    /// their share.
    pub async fn ensure(
        &self,
        spec: &PipelineSpec,
        share_name: &str,
        ctx: &mut RunContext,
    ) -> Result<EnsureReport> {
        let existing = self.remote.pipelines.get(&spec.name).await?;

        let existing = match existing {
            Some(existing) => existing,
            None => match self.create(spec, share_name, ctx).await {
                Ok(report) => return Ok(report),
                Err(e) if e.is_already_exists() => {
                    debug!("Pipeline '{}' appeared concurrently, re-fetching", spec.name);
                    self.remote.pipelines.get(&spec.name).await?.ok_or(e)?
                }
                Err(e) => return Err(e),
            },
        };

        self.converge(spec, share_name, existing, ctx).await
    }

    async fn create(
        &self,
        spec: &PipelineSpec,
        share_name: &str,
        ctx: &mut RunContext,
    ) -> Result<EnsureReport> {
        let request = self.create_request(spec)?;
        info!("Creating pipeline '{}' ({} -> {})", spec.name, request.source_table, request.target_table);
        let created = self.remote.pipelines.create(&request).await?;

        ctx.record_rollback(RollbackEntry::Created {
            kind: ResourceKind::Pipeline,
            name: created.name.clone(),
            id: created.id.clone(),
        });

        let mut changes = vec![String::from("created")];
        if let Some(schedule) = &spec.schedule
            && let Some(state) = ScheduleState::from_schedule(schedule)
        {
            // Rolling back the created pipeline deletes its schedule first,
            // so no separate compensation entry is needed here.
            self.remote.schedules.create(&created.id, &state).await?;
            changes.push(String::from("scheduled"));
        }

        ctx.record_persist(PersistEntry::Pipeline {
            outcome: EnsureOutcome::Created,
            spec: spec.clone(),
            share_name: share_name.to_string(),
        });

        Ok(EnsureReport {
            kind: ResourceKind::Pipeline,
            name: created.name,
            remote_id: created.id,
            outcome: EnsureOutcome::Created,
            changes,
        })
    }

    async fn converge(
        &self,
        spec: &PipelineSpec,
        share_name: &str,
        existing: RemotePipeline,
        ctx: &mut RunContext,
    ) -> Result<EnsureReport> {
        self.check_immutable(spec, &existing)?;

        let current_schedule = self.remote.schedules.get_for_pipeline(&existing.id).await?;
        let prior = PriorState::Pipeline {
            description: existing.description.clone(),
            schedule: current_schedule.as_ref().map(|s| s.state.clone()),
        };
        let mut changes = Vec::new();

        if let Some(description) = &spec.description
            && existing.description.as_deref() != Some(description)
        {
            self.remote
                .pipelines
                .set_description(&existing.id, Some(description))
                .await?;
            changes.push(String::from("set description"));
            self.record_update(&existing, &prior, &changes, ctx);
        }

        if let Some(schedule) = &spec.schedule {
            match (ScheduleState::from_schedule(schedule), &current_schedule) {
                (None, Some(current)) => {
                    debug_assert!(matches!(schedule, Schedule::Remove));
                    self.remote.schedules.delete(&current.id).await?;
                    changes.push(String::from("removed schedule"));
                    self.record_update(&existing, &prior, &changes, ctx);
                }
                (Some(desired), Some(current)) if current.state != desired => {
                    self.remote.schedules.update(&current.id, &desired).await?;
                    changes.push(String::from("rescheduled"));
                    self.record_update(&existing, &prior, &changes, ctx);
                }
                (Some(desired), None) => {
                    self.remote.schedules.create(&existing.id, &desired).await?;
                    changes.push(String::from("scheduled"));
                    self.record_update(&existing, &prior, &changes, ctx);
                }
                _ => {}
            }
        }

        let outcome = if changes.is_empty() {
            debug!("Pipeline '{}' already matches its spec", spec.name);
            EnsureOutcome::Matching
        } else {
            info!("Updated pipeline '{}': {}", spec.name, changes.join(", "));
            EnsureOutcome::Updated
        };

        ctx.record_persist(PersistEntry::Pipeline {
            outcome,
            spec: spec.clone(),
            share_name: share_name.to_string(),
        });

        Ok(EnsureReport {
            kind: ResourceKind::Pipeline,
            name: existing.name,
            remote_id: existing.id,
            outcome,
            changes,
        })
    }

    fn create_request(&self, spec: &PipelineSpec) -> Result<CreatePipelineRequest> {
        let missing = |field: &str| {
            ConfigError::MissingField {
                resource_type: String::from("pipeline"),
                name: spec.name.clone(),
                field: field.to_string(),
            }
        };
        Ok(CreatePipelineRequest {
            name: spec.name.clone(),
            source_table: spec.source_table.clone().ok_or_else(|| missing("source_table"))?,
            target_table: spec.target_table.clone().ok_or_else(|| missing("target_table"))?,
            scd_type: spec.scd_type.ok_or_else(|| missing("scd_type"))?,
            catalog: self.remote.scope.catalog.clone(),
            schema: self.remote.scope.schema.clone(),
            description: spec.description.clone(),
        })
    }

    fn check_immutable(&self, spec: &PipelineSpec, existing: &RemotePipeline) -> Result<()> {
        if let Some(source) = &spec.source_table
            && *source != existing.source_table
        {
            return Err(ConfigError::immutable("pipeline", &spec.name, "source_table").into());
        }
        if let Some(target) = &spec.target_table
            && *target != existing.target_table
        {
            return Err(ConfigError::immutable("pipeline", &spec.name, "target_table").into());
        }
        if let Some(scd) = spec.scd_type
            && scd != existing.scd_type
        {
            return Err(ConfigError::immutable("pipeline", &spec.name, "scd_type").into());
        }
        Ok(())
    }

    /// Records the compensation entry once, on the first applied delta.
    fn record_update(
        &self,
        existing: &RemotePipeline,
        prior: &PriorState,
        changes: &[String],
        ctx: &mut RunContext,
    ) {
        if changes.len() == 1 {
            ctx.record_rollback(RollbackEntry::Updated {
                name: existing.name.clone(),
                id: existing.id.clone(),
                prior: prior.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScdType, Strategy};
    use crate::remote::{
        MockPipelineApi, MockRecipientApi, MockScheduleApi, MockShareApi, RemoteScope,
        RemoteSchedule,
    };
    use std::sync::Arc;

    fn context(pipelines: MockPipelineApi, schedules: MockScheduleApi) -> RemoteContext {
        RemoteContext::new(
            Arc::new(MockRecipientApi::new()),
            Arc::new(MockShareApi::new()),
            Arc::new(pipelines),
            Arc::new(schedules),
            RemoteScope::default(),
        )
    }

    fn spec(name: &str) -> PipelineSpec {
        PipelineSpec {
            name: name.to_string(),
            source_table: Some(String::from("raw.sch.orders")),
            target_table: Some(String::from("cat.sch.orders")),
            scd_type: Some(ScdType::Type2),
            schedule: None,
            description: None,
        }
    }

    fn remote(name: &str) -> RemotePipeline {
        RemotePipeline {
            id: format!("id-{name}"),
            name: name.to_string(),
            source_table: String::from("raw.sch.orders"),
            target_table: String::from("cat.sch.orders"),
            scd_type: ScdType::Type2,
            catalog: None,
            schema: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_creates_pipeline_with_schedule() {
        let mut pipelines = MockPipelineApi::new();
        pipelines.expect_get().returning(|_| Ok(None));
        pipelines.expect_create().returning(|req| Ok(remote(&req.name)));

        let mut schedules = MockScheduleApi::new();
        schedules
            .expect_create()
            .withf(|_, state| matches!(state, ScheduleState::Cron { expr, .. } if expr == "0 0 * * * ?"))
            .times(1)
            .returning(|pipeline_id, state| {
                Ok(RemoteSchedule {
                    id: String::from("sched-1"),
                    pipeline_id: pipeline_id.to_string(),
                    state: state.clone(),
                })
            });

        let mut desired = spec("ingest-orders");
        desired.schedule = Some(Schedule::Cron {
            expr: String::from("0 0 * * * ?"),
            timezone: String::from("UTC"),
        });

        let reconciler = PipelineReconciler::new(context(pipelines, schedules));
        let mut ctx = RunContext::new("pack", Strategy::New);
        let report = reconciler
            .ensure(&desired, "sales", &mut ctx)
            .await
            .expect("ensure");

        assert_eq!(report.outcome, EnsureOutcome::Created);
        assert_eq!(report.changes, vec!["created", "scheduled"]);
        assert_eq!(ctx.rollback_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_create_requires_converge_fields() {
        let mut pipelines = MockPipelineApi::new();
        pipelines.expect_get().returning(|_| Ok(None));

        let mut desired = spec("ingest-orders");
        desired.source_table = None;

        let reconciler = PipelineReconciler::new(context(pipelines, MockScheduleApi::new()));
        let mut ctx = RunContext::new("pack", Strategy::New);
        let err = reconciler
            .ensure(&desired, "sales", &mut ctx)
            .await
            .expect_err("missing source_table must fail");

        assert!(err.to_string().contains("source_table"));
    }

    #[tokio::test]
    async fn test_rejects_scd_type_change() {
        let mut pipelines = MockPipelineApi::new();
        pipelines.expect_get().returning(|name| Ok(Some(remote(name))));

        let mut desired = spec("ingest-orders");
        desired.scd_type = Some(ScdType::Type1);

        let reconciler = PipelineReconciler::new(context(pipelines, MockScheduleApi::new()));
        let mut ctx = RunContext::new("pack", Strategy::Update);
        let err = reconciler
            .ensure(&desired, "sales", &mut ctx)
            .await
            .expect_err("scd_type change must be rejected");

        assert!(err.to_string().contains("scd_type"));
    }

    #[tokio::test]
    async fn test_schedule_remove_deletes_existing() {
        let mut pipelines = MockPipelineApi::new();
        pipelines.expect_get().returning(|name| Ok(Some(remote(name))));

        let mut schedules = MockScheduleApi::new();
        schedules.expect_get_for_pipeline().returning(|pipeline_id| {
            Ok(Some(RemoteSchedule {
                id: String::from("sched-1"),
                pipeline_id: pipeline_id.to_string(),
                state: ScheduleState::Continuous,
            }))
        });
        schedules
            .expect_delete()
            .withf(|id| id == "sched-1")
            .times(1)
            .returning(|_| Ok(()));

        let mut desired = spec("ingest-orders");
        desired.schedule = Some(Schedule::Remove);

        let reconciler = PipelineReconciler::new(context(pipelines, schedules));
        let mut ctx = RunContext::new("pack", Strategy::Update);
        let report = reconciler
            .ensure(&desired, "sales", &mut ctx)
            .await
            .expect("ensure");

        assert_eq!(report.outcome, EnsureOutcome::Updated);
        assert_eq!(report.changes, vec!["removed schedule"]);
    }

    #[tokio::test]
    async fn test_absent_schedule_left_untouched() {
        let mut pipelines = MockPipelineApi::new();
        pipelines.expect_get().returning(|name| Ok(Some(remote(name))));

        let mut schedules = MockScheduleApi::new();
        schedules.expect_get_for_pipeline().returning(|pipeline_id| {
            Ok(Some(RemoteSchedule {
                id: String::from("sched-1"),
                pipeline_id: pipeline_id.to_string(),
                state: ScheduleState::Continuous,
            }))
        });

        let reconciler = PipelineReconciler::new(context(pipelines, schedules));
        let mut ctx = RunContext::new("pack", Strategy::Update);
        let report = reconciler
            .ensure(&spec("ingest-orders"), "sales", &mut ctx)
            .await
            .expect("ensure");

        assert_eq!(report.outcome, EnsureOutcome::Matching);
        assert!(ctx.rollback_entries().is_empty());
    }
}
