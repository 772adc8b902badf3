//! Share-pack fingerprinting.
//!
//! This module provides deterministic hashing of share-pack documents. The
//! fingerprint is recorded on persisted versions so a later audit can tell
//! which document produced a given version.

use sha2::{Digest, Sha256};

use super::spec::{PipelineSpec, RecipientSpec, Schedule, SharePackConfig, ShareSpec};

/// Hasher for computing share-pack fingerprints.
#[derive(Debug, Default)]
pub struct PackHasher;

impl PackHasher {
    /// Creates a new pack hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a fingerprint of the entire share pack.
    #[must_use]
    pub fn hash_pack(&self, config: &SharePackConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(config.metadata.name.as_bytes());
        hasher.update(config.metadata.workspace.as_bytes());
        hasher.update(config.metadata.strategy.to_string().as_bytes());

        for recipient in &config.recipients {
            hasher.update(Self::hash_recipient(recipient).as_bytes());
        }
        for share in &config.shares {
            hasher.update(Self::hash_share(share).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a fingerprint for a single recipient spec.
    #[must_use]
    pub fn hash_recipient(recipient: &RecipientSpec) -> String {
        let mut hasher = Sha256::new();

        hasher.update(recipient.name.as_bytes());
        if let Some(org) = recipient.kind.sharing_org_id() {
            hasher.update(org.as_bytes());
        }
        if let Some(description) = &recipient.description {
            hasher.update(description.as_bytes());
        }

        // Sorted for determinism
        let mut ips: Vec<_> = recipient.ip_access_list.iter().collect();
        ips.sort();
        for ip in ips {
            hasher.update(ip.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a fingerprint for a single share spec.
    #[must_use]
    pub fn hash_share(share: &ShareSpec) -> String {
        let mut hasher = Sha256::new();

        hasher.update(share.name.as_bytes());
        if let Some(description) = &share.description {
            hasher.update(description.as_bytes());
        }

        for list in [
            &share.assets,
            &share.assets_to_add,
            &share.assets_to_remove,
            &share.recipients,
            &share.recipients_to_add,
            &share.recipients_to_remove,
        ] {
            let mut sorted: Vec<_> = list.iter().collect();
            sorted.sort();
            for value in sorted {
                hasher.update(value.as_bytes());
            }
            hasher.update([0u8]);
        }

        let mut pipelines: Vec<_> = share.pipelines.iter().collect();
        pipelines.sort_by(|a, b| a.name.cmp(&b.name));
        for pipeline in pipelines {
            hasher.update(Self::hash_pipeline(pipeline).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a fingerprint for a single pipeline spec.
    #[must_use]
    pub fn hash_pipeline(pipeline: &PipelineSpec) -> String {
        let mut hasher = Sha256::new();

        hasher.update(pipeline.name.as_bytes());
        if let Some(source) = &pipeline.source_table {
            hasher.update(source.as_bytes());
        }
        if let Some(target) = &pipeline.target_table {
            hasher.update(target.as_bytes());
        }
        if let Some(scd) = pipeline.scd_type {
            hasher.update(scd.to_string().as_bytes());
        }
        match &pipeline.schedule {
            Some(Schedule::Cron { expr, timezone }) => {
                hasher.update(expr.as_bytes());
                hasher.update(timezone.as_bytes());
            }
            Some(Schedule::Continuous) => hasher.update(b"continuous".as_slice()),
            Some(Schedule::Remove) => hasher.update(b"remove".as_slice()),
            None => {}
        }
        if let Some(description) = &pipeline.description {
            hasher.update(description.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}
