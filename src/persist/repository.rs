//! Version-log mechanics and the store contract.

use tracing::debug;
use uuid::Uuid;

use crate::error::{PersistError, Result};

use super::types::{VersionMeta, VersionedRecord};

/// Backend holding one record type's full version history.
pub trait VersionStore<T: VersionedRecord>: Send + Sync {
    /// Loads the full history, every version of every entity.
    fn load(&self) -> Result<Vec<T>>;
    /// Replaces the full history.
    fn save(&self, records: &[T]) -> Result<()>;
}

/// An in-process working copy of one record type's history.
///
/// The writer loads a log, applies a run's changes against it, then saves it
/// back in one piece. All version invariants live here: exactly one current
/// version per entity, versions numbered from 1 without gaps, superseded
/// versions closed with a `valid_to` timestamp.
#[derive(Debug, Clone)]
pub struct VersionLog<T: VersionedRecord> {
    records: Vec<T>,
}

impl<T: VersionedRecord> VersionLog<T> {
    /// Wraps a loaded history.
    #[must_use]
    pub const fn new(records: Vec<T>) -> Self {
        Self { records }
    }

    /// The full history.
    #[must_use]
    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// Consumes the log, returning the history for saving.
    #[must_use]
    pub fn into_records(self) -> Vec<T> {
        self.records
    }

    /// The live (current, not deleted) record with the given name, if any.
    #[must_use]
    pub fn live(&self, name: &str) -> Option<&T> {
        self.records
            .iter()
            .find(|r| r.name() == name && r.meta().is_live())
    }

    /// Every live record.
    pub fn live_records(&self) -> impl Iterator<Item = &T> {
        self.records.iter().filter(|r| r.meta().is_live())
    }

    /// Every current record, including deleted markers.
    pub fn current_records(&self) -> impl Iterator<Item = &T> {
        self.records.iter().filter(|r| r.meta().is_current)
    }

    /// Appends the first version of a new entity.
    ///
    /// The record's meta is overwritten with fresh first-version bookkeeping.
    /// Returns the minted entity id.
    pub fn append_new(&mut self, mut record: T, run_id: Uuid, pack_name: &str) -> Uuid {
        let meta = VersionMeta::first(run_id, pack_name);
        let entity_id = meta.entity_id;
        *record.meta_mut() = meta;
        debug!("New entity '{}' ({entity_id})", record.name());
        self.records.push(record);
        entity_id
    }

    /// Closes the entity's current version and appends `record` as its
    /// successor.
    pub fn supersede(&mut self, entity_id: Uuid, mut record: T, run_id: Uuid) -> Result<()> {
        let prior = self.close_current(entity_id)?;
        *record.meta_mut() = prior.next(run_id);
        self.records.push(record);
        Ok(())
    }

    /// Appends a deleted-marker version as the entity's new current version.
    ///
    /// The marker carries the prior version's payload so history shows what
    /// was removed, and the reason it was removed.
    pub fn soft_delete(
        &mut self,
        entity_id: Uuid,
        run_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<()> {
        let index = self
            .records
            .iter()
            .position(|r| r.meta().entity_id == entity_id && r.meta().is_current)
            .ok_or(PersistError::EntityNotFound { entity_id })?;
        let mut marker = self.records[index].clone();
        let prior = self.close_current(entity_id)?;
        let mut meta = prior.next(run_id);
        meta.is_deleted = true;
        meta.deletion_reason = Some(reason.into());
        *marker.meta_mut() = meta;
        debug!("Soft-deleted entity '{}' ({entity_id})", marker.name());
        self.records.push(marker);
        Ok(())
    }

    /// Marks the entity's current version superseded, returning a copy of its
    /// closed meta.
    fn close_current(&mut self, entity_id: Uuid) -> Result<VersionMeta> {
        let current = self
            .records
            .iter_mut()
            .find(|r| r.meta().entity_id == entity_id && r.meta().is_current)
            .ok_or(PersistError::EntityNotFound { entity_id })?;
        let meta = current.meta_mut();
        meta.is_current = false;
        meta.valid_to = Some(chrono::Utc::now());
        Ok(meta.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecipientKind;
    use crate::persist::types::PersistedRecipient;
    use std::collections::BTreeSet;

    fn record(name: &str) -> PersistedRecipient {
        PersistedRecipient {
            meta: VersionMeta::first(Uuid::new_v4(), "pack"),
            name: name.to_string(),
            kind: RecipientKind::Token,
            description: None,
            ip_access_list: BTreeSet::new(),
        }
    }

    #[test]
    fn test_single_current_version_per_entity() {
        let run = Uuid::new_v4();
        let mut log = VersionLog::new(Vec::new());
        let entity = log.append_new(record("acme"), run, "pack");
        log.supersede(entity, record("acme"), run).expect("supersede");
        log.supersede(entity, record("acme"), run).expect("supersede");

        let current: Vec<_> = log.current_records().collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].meta.version, 3);
        assert_eq!(log.records().len(), 3);

        let closed = log
            .records()
            .iter()
            .filter(|r| !r.meta.is_current)
            .collect::<Vec<_>>();
        assert!(closed.iter().all(|r| r.meta.valid_to.is_some()));
    }

    #[test]
    fn test_soft_delete_is_new_current_version() {
        let run = Uuid::new_v4();
        let mut log = VersionLog::new(Vec::new());
        let entity = log.append_new(record("acme"), run, "pack");
        log.soft_delete(entity, run, "torn down").expect("soft delete");

        assert!(log.live("acme").is_none());
        let current: Vec<_> = log.current_records().collect();
        assert_eq!(current.len(), 1);
        assert!(current[0].meta.is_deleted);
        assert_eq!(current[0].meta.version, 2);
        assert_eq!(current[0].meta.deletion_reason.as_deref(), Some("torn down"));
        // Payload survives on the marker.
        assert_eq!(current[0].name, "acme");
    }

    #[test]
    fn test_recreation_mints_new_entity_id() {
        let run = Uuid::new_v4();
        let mut log = VersionLog::new(Vec::new());
        let first = log.append_new(record("acme"), run, "pack");
        log.soft_delete(first, run, "torn down").expect("soft delete");
        let second = log.append_new(record("acme"), run, "pack");

        assert_ne!(first, second);
        assert_eq!(log.live("acme").expect("live").meta.entity_id, second);
        assert_eq!(log.live("acme").expect("live").meta.version, 1);
    }

    #[test]
    fn test_soft_delete_unknown_entity_fails() {
        let mut log: VersionLog<PersistedRecipient> = VersionLog::new(Vec::new());
        let err = log
            .soft_delete(Uuid::new_v4(), Uuid::new_v4(), "torn down")
            .expect_err("unknown entity");
        assert!(err.to_string().contains("No current version"));
    }
}
