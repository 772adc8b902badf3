//! JSON-file version store.
//!
//! Each record type lives in one JSON file holding its full version history.
//! Writes go through a temporary file in the same directory followed by a
//! rename, so a crash mid-write never leaves a truncated store behind.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PersistError, Result};

use super::repository::VersionStore;
use super::types::VersionedRecord;

/// A version store backed by a JSON file.
#[derive(Debug)]
pub struct LocalStore<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> LocalStore<T> {
    /// Creates a store backed by the given file. The file is created on the
    /// first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> VersionStore<T> for LocalStore<T>
where
    T: VersionedRecord + Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            debug!("Store {} does not exist yet, starting empty", self.path.display());
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        let records = serde_json::from_str(&contents).map_err(|e| PersistError::Corrupted {
            message: format!("{}: {e}", self.path.display()),
        })?;
        Ok(records)
    }

    fn save(&self, records: &[T]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| PersistError::serialization(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Saved {} version(s) to {}", records.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecipientKind;
    use crate::persist::types::{PersistedRecipient, VersionMeta};
    use std::collections::BTreeSet;
    use uuid::Uuid;

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
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store: LocalStore<PersistedRecipient> = LocalStore::new(dir.path().join("recipients.json"));
        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("recipients.json");
        let store: LocalStore<PersistedRecipient> = LocalStore::new(&path);

        store.save(&[record("acme"), record("globex")]).expect("save");
        let loaded = store.load().expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "acme");
        assert!(path.exists());
    }

    #[test]
    fn test_corrupted_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("recipients.json");
        fs::write(&path, "not json").expect("write");

        let store: LocalStore<PersistedRecipient> = LocalStore::new(&path);
        let err = store.load().expect_err("corrupted store");
        assert!(err.to_string().contains("corrupted"));
    }
}
