//! Run persistence.
//!
//! After a run has converged the platform, the writer folds its persistence
//! intents into the version logs: new entities for created resources,
//! superseding versions for updates, deleted markers for removals. A
//! resource the platform recreated gets a fresh entity id; the propagation
//! pass then repoints live pipeline records at their share's new id, and the
//! pruning pass soft-deletes pipeline records whose share is gone.
//!
//! The writer only ever runs after remote convergence succeeded, so there is
//! no compensation path here; a failing flush is reported and the remote
//! state stands.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::reconcile::{EnsureOutcome, PersistEntry, ResourceKind, RunContext};

use super::local::LocalStore;
use super::memory::MemoryStore;
use super::repository::{VersionLog, VersionStore};
use super::types::{
    PersistedPipeline, PersistedRecipient, PersistedShare, VersionMeta, VersionedRecord,
};

/// The three version stores a run writes.
#[derive(Clone)]
pub struct Repositories {
    /// Recipient history.
    pub recipients: Arc<dyn VersionStore<PersistedRecipient>>,
    /// Share history.
    pub shares: Arc<dyn VersionStore<PersistedShare>>,
    /// Pipeline history.
    pub pipelines: Arc<dyn VersionStore<PersistedPipeline>>,
}

impl Repositories {
    /// Stores backed by process memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            recipients: Arc::new(MemoryStore::new()),
            shares: Arc::new(MemoryStore::new()),
            pipelines: Arc::new(MemoryStore::new()),
        }
    }

    /// Stores backed by JSON files under `dir`.
    #[must_use]
    pub fn local(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            recipients: Arc::new(LocalStore::new(dir.join("recipients.json"))),
            shares: Arc::new(LocalStore::new(dir.join("shares.json"))),
            pipelines: Arc::new(LocalStore::new(dir.join("pipelines.json"))),
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}

/// What one flush wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    /// New entities.
    pub created: usize,
    /// Superseding versions.
    pub updated: usize,
    /// Intents skipped because the live record already matched.
    pub unchanged: usize,
    /// Deleted markers written.
    pub soft_deleted: usize,
    /// Pipeline records repointed at a recreated share.
    pub propagated: usize,
    /// Pipeline records soft-deleted because their share is gone.
    pub pruned: usize,
}

/// Folds a run's persistence intents into the version logs.
#[derive(Debug)]
pub struct PersistenceWriter {
    repos: Repositories,
}

impl PersistenceWriter {
    /// Creates a writer over the given stores.
    #[must_use]
    pub const fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Writes everything the run recorded, in recording order, then runs the
    /// propagation and pruning passes and saves the logs.
    pub fn flush(&self, ctx: &mut RunContext) -> Result<PersistReport> {
        let run_id = ctx.run_id;
        let pack = ctx.pack_name.clone();
        let entries = ctx.take_persist();

        let mut recipients = VersionLog::new(self.repos.recipients.load()?);
        let mut shares = VersionLog::new(self.repos.shares.load()?);
        let mut pipelines = VersionLog::new(self.repos.pipelines.load()?);
        let mut report = PersistReport::default();

        for entry in entries {
            match entry {
                PersistEntry::Recipient {
                    outcome,
                    spec,
                    resolved_ip,
                } => {
                    let payload = PersistedRecipient {
                        meta: placeholder(run_id, &pack),
                        name: spec.name,
                        kind: spec.kind,
                        description: spec.description,
                        ip_access_list: resolved_ip,
                    };
                    upsert(&mut recipients, payload, outcome, run_id, &pack, &mut report)?;
                }
                PersistEntry::Share {
                    outcome,
                    spec,
                    resolved_assets,
                    resolved_recipients,
                } => {
                    let payload = PersistedShare {
                        meta: placeholder(run_id, &pack),
                        name: spec.name,
                        description: spec.description,
                        assets: resolved_assets,
                        recipients: resolved_recipients,
                    };
                    upsert(&mut shares, payload, outcome, run_id, &pack, &mut report)?;
                }
                PersistEntry::Pipeline {
                    outcome,
                    spec,
                    share_name,
                } => {
                    // Reduced specs (name only) merge forward from the live
                    // record so a converge never erases stored detail.
                    let live = pipelines.live(&spec.name).cloned();
                    let payload = PersistedPipeline {
                        meta: placeholder(run_id, &pack),
                        name: spec.name.clone(),
                        share_id: shares.live(&share_name).map(|s| s.meta.entity_id),
                        share_name,
                        source_table: merge(
                            spec.source_table,
                            live.as_ref().and_then(|l| l.source_table.as_ref()),
                        ),
                        target_table: merge(
                            spec.target_table,
                            live.as_ref().and_then(|l| l.target_table.as_ref()),
                        ),
                        scd_type: spec.scd_type.or_else(|| live.as_ref().and_then(|l| l.scd_type)),
                        schedule: merge(
                            spec.schedule,
                            live.as_ref().and_then(|l| l.schedule.as_ref()),
                        ),
                        description: merge(
                            spec.description,
                            live.as_ref().and_then(|l| l.description.as_ref()),
                        ),
                    };
                    upsert(&mut pipelines, payload, outcome, run_id, &pack, &mut report)?;
                }
                PersistEntry::Removed {
                    kind, name, reason, ..
                } => {
                    let removed = match kind {
                        ResourceKind::Recipient => remove(&mut recipients, &name, run_id, &reason)?,
                        ResourceKind::Share => remove(&mut shares, &name, run_id, &reason)?,
                        ResourceKind::Pipeline => remove(&mut pipelines, &name, run_id, &reason)?,
                        // Schedule state lives on the pipeline record.
                        ResourceKind::Schedule => false,
                    };
                    if removed {
                        report.soft_deleted += 1;
                    }
                }
            }
        }

        report.propagated = propagate_share_ids(&shares, &mut pipelines, run_id)?;
        report.pruned = prune_orphan_pipelines(&shares, &mut pipelines, run_id)?;

        self.repos.recipients.save(recipients.records())?;
        self.repos.shares.save(shares.records())?;
        self.repos.pipelines.save(pipelines.records())?;

        info!(
            "Persisted run {run_id}: {} created, {} updated, {} unchanged, {} removed",
            report.created, report.updated, report.unchanged, report.soft_deleted
        );
        Ok(report)
    }
}

fn placeholder(run_id: Uuid, pack: &str) -> VersionMeta {
    // Overwritten by the log on insert.
    VersionMeta::first(run_id, pack)
}

fn merge<T: Clone>(new: Option<T>, stored: Option<&T>) -> Option<T> {
    new.or_else(|| stored.cloned())
}

fn upsert<T: VersionedRecord>(
    log: &mut VersionLog<T>,
    payload: T,
    outcome: EnsureOutcome,
    run_id: Uuid,
    pack: &str,
    report: &mut PersistReport,
) -> Result<()> {
    let live = log.live(payload.name()).map(|r| r.meta().entity_id);
    match (live, outcome) {
        (Some(_), EnsureOutcome::Matching) => {
            report.unchanged += 1;
        }
        (Some(entity), EnsureOutcome::Updated) => {
            log.supersede(entity, payload, run_id)?;
            report.updated += 1;
        }
        (Some(entity), EnsureOutcome::Created) => {
            // The platform created the resource anew, so the live record
            // describes a predecessor that no longer exists. Close it out and
            // mint a fresh entity.
            log.soft_delete(entity, run_id, "recreated under a new identity")?;
            log.append_new(payload, run_id, pack);
            report.created += 1;
        }
        (None, _) => {
            // Covers creation, recreation after a deleted marker, and
            // adoption of a resource that matched its spec on first sight.
            log.append_new(payload, run_id, pack);
            report.created += 1;
        }
    }
    Ok(())
}

fn remove<T: VersionedRecord>(
    log: &mut VersionLog<T>,
    name: &str,
    run_id: Uuid,
    reason: &str,
) -> Result<bool> {
    match log.live(name).map(|r| r.meta().entity_id) {
        Some(entity) => {
            log.soft_delete(entity, run_id, reason)?;
            Ok(true)
        }
        None => {
            debug!("No live record for removed resource '{name}'");
            Ok(false)
        }
    }
}

/// Repoints live pipeline records whose share was recreated under a new
/// entity id.
fn propagate_share_ids(
    shares: &VersionLog<PersistedShare>,
    pipelines: &mut VersionLog<PersistedPipeline>,
    run_id: Uuid,
) -> Result<usize> {
    let share_ids: HashMap<&str, Uuid> = shares
        .live_records()
        .map(|s| (s.name.as_str(), s.meta.entity_id))
        .collect();

    let stale: Vec<(Uuid, PersistedPipeline)> = pipelines
        .live_records()
        .filter_map(|p| {
            let expected = share_ids.get(p.share_name.as_str()).copied();
            if expected.is_some() && p.share_id != expected {
                let mut fixed = p.clone();
                fixed.share_id = expected;
                Some((p.meta.entity_id, fixed))
            } else {
                None
            }
        })
        .collect();

    let count = stale.len();
    for (entity, fixed) in stale {
        debug!("Repointing pipeline '{}' at recreated share", fixed.name);
        pipelines.supersede(entity, fixed, run_id)?;
    }
    Ok(count)
}

/// Soft-deletes live pipeline records whose share has no live record.
fn prune_orphan_pipelines(
    shares: &VersionLog<PersistedShare>,
    pipelines: &mut VersionLog<PersistedPipeline>,
    run_id: Uuid,
) -> Result<usize> {
    let orphans: Vec<Uuid> = pipelines
        .live_records()
        .filter(|p| shares.live(&p.share_name).is_none())
        .map(|p| p.meta.entity_id)
        .collect();

    let count = orphans.len();
    for entity in orphans {
        pipelines.soft_delete(entity, run_id, "owning share has no live record")?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineSpec, RecipientKind, RecipientSpec, ScdType, ShareSpec, Strategy};
    use std::collections::BTreeSet;

    fn recipient_entry(outcome: EnsureOutcome, name: &str) -> PersistEntry {
        PersistEntry::Recipient {
            outcome,
            spec: RecipientSpec {
                name: name.to_string(),
                kind: RecipientKind::Token,
                description: None,
                ip_access_list: Vec::new(),
            },
            resolved_ip: BTreeSet::new(),
        }
    }

    fn share_entry(outcome: EnsureOutcome, name: &str) -> PersistEntry {
        PersistEntry::Share {
            outcome,
            spec: ShareSpec {
                name: name.to_string(),
                description: None,
                assets: Vec::new(),
                assets_to_add: Vec::new(),
                assets_to_remove: Vec::new(),
                recipients: Vec::new(),
                recipients_to_add: Vec::new(),
                recipients_to_remove: Vec::new(),
                pipelines: Vec::new(),
            },
            resolved_assets: [String::from("cat.sch.t1")].into_iter().collect(),
            resolved_recipients: BTreeSet::new(),
        }
    }

    fn pipeline_entry(outcome: EnsureOutcome, name: &str, share: &str) -> PersistEntry {
        PersistEntry::Pipeline {
            outcome,
            spec: PipelineSpec {
                name: name.to_string(),
                source_table: Some(String::from("raw.sch.t1")),
                target_table: Some(String::from("cat.sch.t1")),
                scd_type: Some(ScdType::Type2),
                schedule: None,
                description: None,
            },
            share_name: share.to_string(),
        }
    }

    fn flush(writer: &PersistenceWriter, entries: Vec<PersistEntry>) -> PersistReport {
        let mut ctx = RunContext::new("pack", Strategy::Update);
        for entry in entries {
            ctx.record_persist(entry);
        }
        writer.flush(&mut ctx).expect("flush")
    }

    #[test]
    fn test_first_run_creates_entities() {
        let repos = Repositories::in_memory();
        let writer = PersistenceWriter::new(repos.clone());

        let report = flush(
            &writer,
            vec![
                recipient_entry(EnsureOutcome::Created, "acme"),
                share_entry(EnsureOutcome::Created, "sales"),
                pipeline_entry(EnsureOutcome::Created, "ingest", "sales"),
            ],
        );

        assert_eq!(report.created, 3);
        let pipelines = repos.pipelines.load().expect("load");
        let share = &repos.shares.load().expect("load")[0];
        assert_eq!(pipelines[0].share_id, Some(share.meta.entity_id));
        assert_eq!(pipelines[0].meta.version, 1);
    }

    #[test]
    fn test_matching_entry_writes_nothing() {
        let repos = Repositories::in_memory();
        let writer = PersistenceWriter::new(repos.clone());

        flush(&writer, vec![recipient_entry(EnsureOutcome::Created, "acme")]);
        let report = flush(&writer, vec![recipient_entry(EnsureOutcome::Matching, "acme")]);

        assert_eq!(report.unchanged, 1);
        assert_eq!(repos.recipients.load().expect("load").len(), 1);
    }

    #[test]
    fn test_matching_without_record_adopts() {
        let repos = Repositories::in_memory();
        let writer = PersistenceWriter::new(repos.clone());

        let report = flush(&writer, vec![recipient_entry(EnsureOutcome::Matching, "acme")]);

        assert_eq!(report.created, 1);
        assert_eq!(repos.recipients.load().expect("load").len(), 1);
    }

    #[test]
    fn test_update_supersedes() {
        let repos = Repositories::in_memory();
        let writer = PersistenceWriter::new(repos.clone());

        flush(&writer, vec![recipient_entry(EnsureOutcome::Created, "acme")]);
        let report = flush(&writer, vec![recipient_entry(EnsureOutcome::Updated, "acme")]);

        assert_eq!(report.updated, 1);
        let records = repos.recipients.load().expect("load");
        assert_eq!(records.len(), 2);
        let current: Vec<_> = records.iter().filter(|r| r.meta.is_current).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].meta.version, 2);
    }

    #[test]
    fn test_share_recreation_propagates_to_pipelines() {
        let repos = Repositories::in_memory();
        let writer = PersistenceWriter::new(repos.clone());

        flush(
            &writer,
            vec![
                share_entry(EnsureOutcome::Created, "sales"),
                pipeline_entry(EnsureOutcome::Created, "ingest", "sales"),
            ],
        );
        let old_share = repos.shares.load().expect("load")[0].meta.entity_id;

        // The share vanished remotely and the run recreated it; the pipeline
        // itself was untouched.
        let report = flush(
            &writer,
            vec![
                share_entry(EnsureOutcome::Created, "sales"),
                pipeline_entry(EnsureOutcome::Matching, "ingest", "sales"),
            ],
        );

        assert_eq!(report.propagated, 1);
        let shares = repos.shares.load().expect("load");
        let new_share = shares
            .iter()
            .find(|s| s.meta.is_live())
            .expect("live share")
            .meta
            .entity_id;
        assert_ne!(old_share, new_share);

        let pipelines = repos.pipelines.load().expect("load");
        let live = pipelines.iter().find(|p| p.meta.is_live()).expect("live pipeline");
        assert_eq!(live.share_id, Some(new_share));
        assert_eq!(live.meta.version, 2);
    }

    #[test]
    fn test_removed_share_prunes_pipelines() {
        let repos = Repositories::in_memory();
        let writer = PersistenceWriter::new(repos.clone());

        flush(
            &writer,
            vec![
                share_entry(EnsureOutcome::Created, "sales"),
                pipeline_entry(EnsureOutcome::Created, "ingest", "sales"),
            ],
        );
        let report = flush(
            &writer,
            vec![PersistEntry::Removed {
                kind: ResourceKind::Share,
                name: String::from("sales"),
                share_name: None,
                reason: String::from("torn down"),
            }],
        );

        assert_eq!(report.soft_deleted, 1);
        assert_eq!(report.pruned, 1);
        let pipelines = repos.pipelines.load().expect("load");
        assert!(pipelines.iter().all(|p| !p.meta.is_live()));
    }

    #[test]
    fn test_reduced_pipeline_spec_merges_forward() {
        let repos = Repositories::in_memory();
        let writer = PersistenceWriter::new(repos.clone());

        flush(
            &writer,
            vec![
                share_entry(EnsureOutcome::Created, "sales"),
                pipeline_entry(EnsureOutcome::Created, "ingest", "sales"),
            ],
        );

        let reduced = PersistEntry::Pipeline {
            outcome: EnsureOutcome::Updated,
            spec: PipelineSpec {
                name: String::from("ingest"),
                source_table: None,
                target_table: None,
                scd_type: None,
                schedule: None,
                description: Some(String::from("refreshed")),
            },
            share_name: String::from("sales"),
        };
        flush(&writer, vec![reduced]);

        let pipelines = repos.pipelines.load().expect("load");
        let live = pipelines.iter().find(|p| p.meta.is_live()).expect("live pipeline");
        assert_eq!(live.source_table.as_deref(), Some("raw.sch.t1"));
        assert_eq!(live.description.as_deref(), Some("refreshed"));
    }
}
