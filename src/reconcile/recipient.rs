//! Recipient reconciliation.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::config::{to_set, RecipientSpec};
use crate::diff::DiffEngine;
use crate::error::{ConfigError, Result};
use crate::remote::{
    AuthenticationKind, CreateRecipientRequest, RemoteContext, RemoteRecipient,
};
use crate::rollback::{PriorState, RollbackEntry};

use super::{EnsureOutcome, EnsureReport, PersistEntry, ResourceKind, RunContext};

/// Converges recipients toward their spec.
#[derive(Debug)]
pub struct RecipientReconciler {
    remote: RemoteContext,
    diff: DiffEngine,
}

impl RecipientReconciler {
    /// Creates a reconciler operating against the given platform.
    #[must_use]
    pub fn new(remote: RemoteContext) -> Self {
        Self {
            remote,
            diff: DiffEngine::new(),
        }
    }

    /// Ensures the recipient exists and matches its spec.
    ///
    /// Missing recipients are created; existing ones receive deltas in a
    /// fixed order (description, then IP additions, then IP removals). A
    /// create that loses a race to a concurrent writer falls back to the
    /// update path against the re-fetched resource.
    pub async fn ensure(&self, spec: &RecipientSpec, ctx: &mut RunContext) -> Result<EnsureReport> {
        let existing = self.remote.recipients.get(&spec.name).await?;

        let existing = match existing {
            Some(existing) => existing,
            None => match self.create(spec, ctx).await {
                Ok(report) => return Ok(report),
                Err(e) if e.is_already_exists() => {
                    debug!("Recipient '{}' appeared concurrently, re-fetching", spec.name);
                    self.remote.recipients.get(&spec.name).await?.ok_or(e)?
                }
                Err(e) => return Err(e),
            },
        };

        self.converge(spec, existing, ctx).await
    }

    async fn create(&self, spec: &RecipientSpec, ctx: &mut RunContext) -> Result<EnsureReport> {
        info!("Creating recipient '{}'", spec.name);
        let request = CreateRecipientRequest::from_spec(spec);
        let created = self.remote.recipients.create(&request).await?;

        ctx.record_rollback(RollbackEntry::Created {
            kind: ResourceKind::Recipient,
            name: created.name.clone(),
            id: created.id.clone(),
        });
        ctx.record_persist(PersistEntry::Recipient {
            outcome: EnsureOutcome::Created,
            spec: spec.clone(),
            resolved_ip: request.ip_access_list,
        });

        Ok(EnsureReport {
            kind: ResourceKind::Recipient,
            name: created.name,
            remote_id: created.id,
            outcome: EnsureOutcome::Created,
            changes: vec![String::from("created")],
        })
    }

    async fn converge(
        &self,
        spec: &RecipientSpec,
        existing: RemoteRecipient,
        ctx: &mut RunContext,
    ) -> Result<EnsureReport> {
        self.check_immutable(spec, &existing)?;

        let prior = PriorState::Recipient {
            description: existing.description.clone(),
            ip_access_list: existing.ip_access_list.clone(),
        };
        let mut changes = Vec::new();

        let ip_diff = self.diff.diff(
            &spec.name,
            "ip_access_list",
            &to_set(&spec.ip_access_list),
            &BTreeSet::new(),
            &BTreeSet::new(),
            &existing.ip_access_list,
        );
        let resolved_ip = ip_diff.apply_to(&existing.ip_access_list);

        if let Some(description) = &spec.description
            && existing.description.as_deref() != Some(description)
        {
            self.remote
                .recipients
                .set_description(&existing.id, Some(description))
                .await?;
            changes.push(String::from("set description"));
            self.record_update(&existing, &prior, &changes, ctx);
        }

        if !ip_diff.add.is_empty() {
            self.remote
                .recipients
                .add_ip_addresses(&existing.id, &ip_diff.add)
                .await?;
            changes.push(format!("added {} ip address(es)", ip_diff.add.len()));
            self.record_update(&existing, &prior, &changes, ctx);
        }
        if !ip_diff.remove.is_empty() {
            self.remote
                .recipients
                .remove_ip_addresses(&existing.id, &ip_diff.remove)
                .await?;
            changes.push(format!("removed {} ip address(es)", ip_diff.remove.len()));
            self.record_update(&existing, &prior, &changes, ctx);
        }

        let outcome = if changes.is_empty() {
            debug!("Recipient '{}' already matches its spec", spec.name);
            EnsureOutcome::Matching
        } else {
            info!("Updated recipient '{}': {}", spec.name, changes.join(", "));
            EnsureOutcome::Updated
        };

        ctx.record_persist(PersistEntry::Recipient {
            outcome,
            spec: spec.clone(),
            resolved_ip,
        });

        Ok(EnsureReport {
            kind: ResourceKind::Recipient,
            name: existing.name,
            remote_id: existing.id,
            outcome,
            changes,
        })
    }

    /// Records the compensation entry once, on the first applied delta.
    fn record_update(
        &self,
        existing: &RemoteRecipient,
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

    fn check_immutable(&self, spec: &RecipientSpec, existing: &RemoteRecipient) -> Result<()> {
        let desired = AuthenticationKind::from_kind(&spec.kind);
        if existing.authentication != desired {
            return Err(ConfigError::immutable("recipient", &spec.name, "kind").into());
        }
        if let Some(org) = spec.kind.sharing_org_id()
            && existing.sharing_org_id.as_deref() != Some(org)
        {
            return Err(ConfigError::immutable("recipient", &spec.name, "sharing_org_id").into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecipientKind, Strategy};
    use crate::remote::{
        MockPipelineApi, MockRecipientApi, MockScheduleApi, MockShareApi, RemoteScope,
    };
    use std::sync::Arc;

    fn context(recipients: MockRecipientApi) -> RemoteContext {
        RemoteContext::new(
            Arc::new(recipients),
            Arc::new(MockShareApi::new()),
            Arc::new(MockPipelineApi::new()),
            Arc::new(MockScheduleApi::new()),
            RemoteScope::default(),
        )
    }

    fn spec(name: &str) -> RecipientSpec {
        RecipientSpec {
            name: name.to_string(),
            kind: RecipientKind::Token,
            description: None,
            ip_access_list: Vec::new(),
        }
    }

    fn remote(name: &str) -> RemoteRecipient {
        RemoteRecipient {
            id: format!("id-{name}"),
            name: name.to_string(),
            authentication: AuthenticationKind::Token,
            sharing_org_id: None,
            description: None,
            ip_access_list: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn test_creates_missing_recipient() {
        let mut recipients = MockRecipientApi::new();
        recipients.expect_get().returning(|_| Ok(None));
        recipients.expect_create().returning(|req| {
            let mut r = remote(&req.name);
            r.ip_access_list = req.ip_access_list.clone();
            Ok(r)
        });

        let reconciler = RecipientReconciler::new(context(recipients));
        let mut ctx = RunContext::new("pack", Strategy::New);
        let report = reconciler.ensure(&spec("acme"), &mut ctx).await.expect("ensure");

        assert_eq!(report.outcome, EnsureOutcome::Created);
        assert_eq!(ctx.rollback_entries().len(), 1);
        assert_eq!(ctx.persist_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_matching_recipient_makes_no_mutation() {
        let mut recipients = MockRecipientApi::new();
        recipients.expect_get().returning(|name| Ok(Some(remote(name))));

        let reconciler = RecipientReconciler::new(context(recipients));
        let mut ctx = RunContext::new("pack", Strategy::Update);
        let report = reconciler.ensure(&spec("acme"), &mut ctx).await.expect("ensure");

        assert_eq!(report.outcome, EnsureOutcome::Matching);
        assert!(ctx.rollback_entries().is_empty());
        // Matching resources still get a persistence intent.
        assert_eq!(ctx.persist_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_applies_ip_diff() {
        let mut recipients = MockRecipientApi::new();
        recipients.expect_get().returning(|name| {
            let mut r = remote(name);
            r.ip_access_list = [String::from("10.0.0.1"), String::from("10.0.0.9")]
                .into_iter()
                .collect();
            Ok(Some(r))
        });
        recipients
            .expect_add_ip_addresses()
            .withf(|_, addrs| addrs.contains("10.0.0.2") && addrs.len() == 1)
            .times(1)
            .returning(|_, _| Ok(()));
        recipients
            .expect_remove_ip_addresses()
            .withf(|_, addrs| addrs.contains("10.0.0.9") && addrs.len() == 1)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut desired = spec("acme");
        desired.ip_access_list = vec![String::from("10.0.0.1"), String::from("10.0.0.2")];

        let reconciler = RecipientReconciler::new(context(recipients));
        let mut ctx = RunContext::new("pack", Strategy::Update);
        let report = reconciler.ensure(&desired, &mut ctx).await.expect("ensure");

        assert_eq!(report.outcome, EnsureOutcome::Updated);
        // One compensation entry regardless of how many deltas were applied.
        assert_eq!(ctx.rollback_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_kind_change() {
        let mut recipients = MockRecipientApi::new();
        recipients.expect_get().returning(|name| Ok(Some(remote(name))));

        let mut desired = spec("acme");
        desired.kind = RecipientKind::D2d {
            sharing_org_id: String::from("org-1"),
        };

        let reconciler = RecipientReconciler::new(context(recipients));
        let mut ctx = RunContext::new("pack", Strategy::Update);
        let err = reconciler
            .ensure(&desired, &mut ctx)
            .await
            .expect_err("kind change must be rejected");

        assert!(err.to_string().contains("immutable"));
        assert!(ctx.rollback_entries().is_empty());
    }

    #[tokio::test]
    async fn test_create_conflict_falls_back_to_update() {
        let mut recipients = MockRecipientApi::new();
        let mut first = true;
        recipients.expect_get().returning(move |name| {
            if first {
                first = false;
                Ok(None)
            } else {
                Ok(Some(remote(name)))
            }
        });
        recipients.expect_create().returning(|req| {
            Err(crate::error::RemoteError::already_exists("recipient", &req.name).into())
        });

        let reconciler = RecipientReconciler::new(context(recipients));
        let mut ctx = RunContext::new("pack", Strategy::New);
        let report = reconciler.ensure(&spec("acme"), &mut ctx).await.expect("ensure");

        assert_eq!(report.outcome, EnsureOutcome::Matching);
    }
}
