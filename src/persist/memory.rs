//! In-memory version store, used by tests and dry runs.

use std::sync::RwLock;

use crate::error::{PersistError, Result};

use super::repository::VersionStore;
use super::types::VersionedRecord;

/// A version store holding history in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore<T> {
    records: RwLock<Vec<T>>,
}

impl<T> MemoryStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl<T: VersionedRecord> VersionStore<T> for MemoryStore<T> {
    fn load(&self) -> Result<Vec<T>> {
        let records = self
            .records
            .read()
            .map_err(|_| PersistError::storage("store lock poisoned"))?;
        Ok(records.clone())
    }

    fn save(&self, records: &[T]) -> Result<()> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| PersistError::storage("store lock poisoned"))?;
        *guard = records.to_vec();
        Ok(())
    }
}
