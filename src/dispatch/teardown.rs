//! The teardown flow (DELETE strategy).
//!
//! Resources come down in dependency order: each share's pipelines (schedule
//! first), then the share, then the pack's recipients. Pipelines are
//! cascaded in two passes: the explicitly listed names, then every remaining
//! platform pipeline feeding the share's assets. The second pass always
//! runs, so listing a subset of pipeline names does not protect the rest; a
//! warning names each unlisted pipeline it takes down. Resources already
//! absent are recorded and skipped, so teardown is idempotent.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::config::{SharePackConfig, ShareSpec};
use crate::error::Result;
use crate::reconcile::{PersistEntry, ResourceKind, RunContext};
use crate::remote::RemoteShare;
use crate::status::StatusTracker;

use super::Provisioner;

impl Provisioner {
    pub(super) async fn teardown(
        &self,
        pack: &SharePackConfig,
        ctx: &mut RunContext,
        tracker: &mut StatusTracker,
    ) -> Result<()> {
        for share in &pack.shares {
            let remote_share = self.remote.shares.get(&share.name).await?;
            let mut handled: HashSet<String> = HashSet::new();

            for pipeline in &share.pipelines {
                match self.remote.pipelines.get(&pipeline.name).await? {
                    Some(remote_pipeline) => {
                        self.delete_pipeline(&remote_pipeline).await?;

                        ctx.record_persist(PersistEntry::Removed {
                            kind: ResourceKind::Pipeline,
                            name: remote_pipeline.name.clone(),
                            share_name: Some(share.name.clone()),
                            reason: String::from("pack teardown"),
                        });
                        tracker.record(format!("pipeline/{}", remote_pipeline.name), "deleted");
                    }
                    None => {
                        tracker.record(format!("pipeline/{}", pipeline.name), "already absent");
                    }
                }
                handled.insert(pipeline.name.clone());
            }

            if let Some(remote_share) = &remote_share {
                self.cascade_unlisted_dependents(share, remote_share, &mut handled, ctx, tracker)
                    .await?;
            }

            match remote_share {
                Some(remote_share) => {
                    self.remote.shares.delete(&remote_share.id).await?;
                    info!("Deleted share '{}'", remote_share.name);

                    ctx.record_persist(PersistEntry::Removed {
                        kind: ResourceKind::Share,
                        name: remote_share.name.clone(),
                        share_name: None,
                        reason: String::from("pack teardown"),
                    });
                    tracker.record(format!("share/{}", remote_share.name), "deleted");
                }
                None => {
                    tracker.record(format!("share/{}", share.name), "already absent");
                }
            }
        }

        for recipient in &pack.recipients {
            match self.remote.recipients.get(&recipient.name).await? {
                Some(remote_recipient) => {
                    self.remote.recipients.delete(&remote_recipient.id).await?;
                    info!("Deleted recipient '{}'", remote_recipient.name);

                    ctx.record_persist(PersistEntry::Removed {
                        kind: ResourceKind::Recipient,
                        name: remote_recipient.name.clone(),
                        share_name: None,
                        reason: String::from("pack teardown"),
                    });
                    tracker.record(format!("recipient/{}", remote_recipient.name), "deleted");
                }
                None => {
                    tracker.record(format!("recipient/{}", recipient.name), "already absent");
                }
            }
        }

        Ok(())
    }

    /// The implicit cascade: deletes every remaining platform pipeline
    /// feeding the share's assets. Listing only a subset of pipeline names
    /// does not protect the rest; each unlisted pipeline taken down is named
    /// in a warning so the asymmetry is never silent.
    async fn cascade_unlisted_dependents(
        &self,
        share: &ShareSpec,
        remote_share: &RemoteShare,
        handled: &mut HashSet<String>,
        ctx: &mut RunContext,
        tracker: &mut StatusTracker,
    ) -> Result<()> {
        for asset in &remote_share.assets {
            let filter = self.remote.pipeline_filter(Some(asset));
            for pipeline in self.remote.pipelines.list(&filter).await? {
                if handled.contains(&pipeline.name) {
                    continue;
                }
                let message = format!(
                    "Pipeline '{}' feeds asset '{asset}' of share '{}' but was not listed for teardown; deleting it with the share",
                    pipeline.name, share.name
                );
                warn!("{message}");
                ctx.warn(message);

                self.delete_pipeline(&pipeline).await?;
                ctx.record_persist(PersistEntry::Removed {
                    kind: ResourceKind::Pipeline,
                    name: pipeline.name.clone(),
                    share_name: Some(share.name.clone()),
                    reason: String::from("unlisted dependent of torn-down share"),
                });
                tracker.record(format!("pipeline/{}", pipeline.name), "deleted (unlisted)");
                handled.insert(pipeline.name);
            }
        }
        Ok(())
    }

    /// Deletes a pipeline, taking its schedule down first.
    async fn delete_pipeline(&self, pipeline: &crate::remote::RemotePipeline) -> Result<()> {
        if let Some(schedule) = self.remote.schedules.get_for_pipeline(&pipeline.id).await? {
            self.remote.schedules.delete(&schedule.id).await?;
        }
        self.remote.pipelines.delete(&pipeline.id).await?;
        info!("Deleted pipeline '{}'", pipeline.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PackMetadata, PipelineSpec, RecipientKind, RecipientSpec, Strategy};
    use crate::persist::Repositories;
    use crate::remote::{
        AuthenticationKind, MockPipelineApi, MockRecipientApi, MockScheduleApi, MockShareApi,
        RemoteContext, RemotePipeline, RemoteRecipient, RemoteSchedule, RemoteScope, ScheduleState,
    };
    use crate::status::RunState;
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};

    fn delete_pack() -> SharePackConfig {
        SharePackConfig {
            metadata: PackMetadata {
                name: String::from("sales-pack"),
                workspace: String::from("analytics"),
                strategy: Strategy::Delete,
                catalog: None,
                schema: None,
                owner: None,
                description: None,
            },
            recipients: vec![RecipientSpec {
                name: String::from("acme"),
                kind: RecipientKind::Token,
                description: None,
                ip_access_list: Vec::new(),
            }],
            shares: vec![ShareSpec {
                name: String::from("sales"),
                description: None,
                assets: Vec::new(),
                assets_to_add: Vec::new(),
                assets_to_remove: Vec::new(),
                recipients: Vec::new(),
                recipients_to_add: Vec::new(),
                recipients_to_remove: Vec::new(),
                pipelines: vec![PipelineSpec {
                    name: String::from("orders-scd2"),
                    source_table: None,
                    target_table: None,
                    scd_type: None,
                    schedule: None,
                    description: None,
                }],
            }],
        }
    }

    /// Replays an earlier converge run so the stores hold live records for
    /// everything the DELETE pack names.
    fn seed_records(repos: &Repositories) {
        use crate::persist::PersistenceWriter;
        use crate::reconcile::EnsureOutcome;

        let pack = delete_pack();
        let mut ctx = RunContext::new("sales-pack", Strategy::New);
        ctx.record_persist(PersistEntry::Recipient {
            outcome: EnsureOutcome::Created,
            spec: pack.recipients[0].clone(),
            resolved_ip: BTreeSet::new(),
        });
        ctx.record_persist(PersistEntry::Share {
            outcome: EnsureOutcome::Created,
            spec: pack.shares[0].clone(),
            resolved_assets: [String::from("cat.sch.orders")].into_iter().collect(),
            resolved_recipients: BTreeSet::new(),
        });
        ctx.record_persist(PersistEntry::Pipeline {
            outcome: EnsureOutcome::Created,
            spec: pack.shares[0].pipelines[0].clone(),
            share_name: String::from("sales"),
        });
        PersistenceWriter::new(repos.clone())
            .flush(&mut ctx)
            .expect("seed");
    }

    fn remote_share(name: &str, assets: &[&str]) -> RemoteShare {
        RemoteShare {
            id: format!("s-{name}"),
            name: name.to_string(),
            description: None,
            assets: assets.iter().map(|a| (*a).to_string()).collect(),
            recipients: BTreeSet::new(),
        }
    }

    fn remote_pipeline(name: &str, target: &str) -> RemotePipeline {
        RemotePipeline {
            id: format!("p-{name}"),
            name: name.to_string(),
            source_table: String::from("raw.sch.orders"),
            target_table: target.to_string(),
            scd_type: crate::config::ScdType::Type2,
            catalog: None,
            schema: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_teardown_deletes_in_dependency_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut shares = MockShareApi::new();
        shares
            .expect_get()
            .returning(|name| Ok(Some(remote_share(name, &["cat.sch.orders"]))));
        let log = Arc::clone(&order);
        shares.expect_delete().times(1).returning(move |id| {
            log.lock().expect("lock").push(format!("share:{id}"));
            Ok(())
        });

        let mut pipelines = MockPipelineApi::new();
        pipelines
            .expect_get()
            .returning(|name| Ok(Some(remote_pipeline(name, "cat.sch.orders"))));
        pipelines
            .expect_list()
            .returning(|_| Ok(vec![remote_pipeline("orders-scd2", "cat.sch.orders")]));
        let log = Arc::clone(&order);
        pipelines.expect_delete().times(1).returning(move |id| {
            log.lock().expect("lock").push(format!("pipeline:{id}"));
            Ok(())
        });

        let mut schedules = MockScheduleApi::new();
        schedules.expect_get_for_pipeline().returning(|pipeline_id| {
            Ok(Some(RemoteSchedule {
                id: String::from("sched-1"),
                pipeline_id: pipeline_id.to_string(),
                state: ScheduleState::Continuous,
            }))
        });
        let log = Arc::clone(&order);
        schedules.expect_delete().times(1).returning(move |id| {
            log.lock().expect("lock").push(format!("schedule:{id}"));
            Ok(())
        });

        let mut recipients = MockRecipientApi::new();
        recipients.expect_get().returning(|name| {
            Ok(Some(RemoteRecipient {
                id: format!("r-{name}"),
                name: name.to_string(),
                authentication: AuthenticationKind::Token,
                sharing_org_id: None,
                description: None,
                ip_access_list: BTreeSet::new(),
            }))
        });
        let log = Arc::clone(&order);
        recipients.expect_delete().times(1).returning(move |id| {
            log.lock().expect("lock").push(format!("recipient:{id}"));
            Ok(())
        });

        let remote = RemoteContext::new(
            Arc::new(recipients),
            Arc::new(shares),
            Arc::new(pipelines),
            Arc::new(schedules),
            RemoteScope::default(),
        );
        let repos = Repositories::in_memory();
        seed_records(&repos);
        let provisioner = Provisioner::new(remote, repos.clone());

        let outcome = provisioner.provision(&delete_pack()).await.expect("run");
        assert_eq!(outcome.status.state, RunState::Succeeded);
        assert_eq!(
            *order.lock().expect("lock"),
            vec![
                "schedule:sched-1",
                "pipeline:p-orders-scd2",
                "share:s-sales",
                "recipient:r-acme",
            ]
        );
        assert_eq!(outcome.persist.expect("persisted").soft_deleted, 3);
    }

    #[tokio::test]
    async fn test_teardown_cascades_to_unlisted_pipelines_with_warning() {
        let deleted = Arc::new(Mutex::new(Vec::new()));

        let mut shares = MockShareApi::new();
        shares
            .expect_get()
            .returning(|name| Ok(Some(remote_share(name, &["cat.sch.orders"]))));
        shares.expect_delete().returning(|_| Ok(()));

        // One listed pipeline, two strangers feeding the same asset. Listing
        // a subset does not protect the rest.
        let mut pipelines = MockPipelineApi::new();
        pipelines.expect_list().returning(|_| {
            Ok(vec![
                remote_pipeline("orders-scd2", "cat.sch.orders"),
                remote_pipeline("orders-backfill", "cat.sch.orders"),
                remote_pipeline("orders-snapshot", "cat.sch.orders"),
            ])
        });
        pipelines
            .expect_get()
            .returning(|name| Ok(Some(remote_pipeline(name, "cat.sch.orders"))));
        let log = Arc::clone(&deleted);
        pipelines.expect_delete().times(3).returning(move |id| {
            log.lock().expect("lock").push(id.to_string());
            Ok(())
        });

        let mut schedules = MockScheduleApi::new();
        schedules.expect_get_for_pipeline().returning(|_| Ok(None));

        let mut recipients = MockRecipientApi::new();
        recipients.expect_get().returning(|_| Ok(None));

        let remote = RemoteContext::new(
            Arc::new(recipients),
            Arc::new(shares),
            Arc::new(pipelines),
            Arc::new(schedules),
            RemoteScope::default(),
        );
        let provisioner = Provisioner::new(remote, Repositories::in_memory());

        let outcome = provisioner.provision(&delete_pack()).await.expect("run");
        assert_eq!(outcome.status.state, RunState::Succeeded);

        // The listed pipeline goes first, then the cascade.
        assert_eq!(
            *deleted.lock().expect("lock"),
            vec!["p-orders-scd2", "p-orders-backfill", "p-orders-snapshot"]
        );
        let warnings = &outcome.status.warnings;
        assert!(warnings.iter().any(|w| w.contains("orders-backfill")));
        assert!(warnings.iter().any(|w| w.contains("orders-snapshot")));
        assert!(!warnings.iter().any(|w| w.contains("'orders-scd2'")));
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent_when_everything_is_gone() {
        let mut shares = MockShareApi::new();
        shares.expect_get().returning(|_| Ok(None));
        let mut pipelines = MockPipelineApi::new();
        pipelines.expect_get().returning(|_| Ok(None));
        let mut recipients = MockRecipientApi::new();
        recipients.expect_get().returning(|_| Ok(None));

        let remote = RemoteContext::new(
            Arc::new(recipients),
            Arc::new(shares),
            Arc::new(pipelines),
            Arc::new(MockScheduleApi::new()),
            RemoteScope::default(),
        );
        let provisioner = Provisioner::new(remote, Repositories::in_memory());

        let outcome = provisioner.provision(&delete_pack()).await.expect("run");
        assert_eq!(outcome.status.state, RunState::Succeeded);
        assert_eq!(outcome.persist.expect("persisted").soft_deleted, 0);
        assert!(outcome
            .status
            .steps
            .iter()
            .all(|s| s.detail == "already absent"));
    }
}
