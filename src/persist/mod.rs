//! Versioned state persistence.
//!
//! Every resource a run touches leaves an append-only version trail: one
//! record per version, a single current version per entity, removals as
//! soft-delete markers. Stores are pluggable; JSON files and process memory
//! ship here.

mod local;
mod memory;
mod repository;
mod types;
mod writer;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use repository::{VersionLog, VersionStore};
pub use types::{
    PersistedPipeline, PersistedRecipient, PersistedShare, VersionMeta, VersionedRecord,
};
pub use writer::{PersistReport, PersistenceWriter, Repositories};
