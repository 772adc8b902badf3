//! Share-pack document handling.
//!
//! This module provides parsing, validation, and fingerprinting of the
//! declarative share-pack document.

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::PackHasher;
pub use parser::PackParser;
pub use spec::{
    to_set, PackMetadata, PipelineSpec, RecipientKind, RecipientSpec, ScdType, Schedule,
    SharePackConfig, ShareSpec, Strategy,
};
pub use validator::{PackValidator, ValidationError, ValidationResult};
