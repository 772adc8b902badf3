//! Error types for the sharepack provisioning system.
//!
//! This module provides a comprehensive error hierarchy for all operations
//! in the provisioning lifecycle: configuration, remote platform calls,
//! reconciliation, and persistence.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// The main error type for the sharepack provisioning system.
#[derive(Debug, Error)]
pub enum SharePackError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote sharing-platform errors.
    #[error("Remote platform error: {0}")]
    Remote(#[from] RemoteError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Persistence errors.
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
///
/// These all fail fast, before any remote mutation is attempted, so no
/// rollback is ever needed for them.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The share-pack document was not found.
    #[error("Share pack document not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The share-pack document could not be parsed.
    #[error("Failed to parse share pack: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
    },

    /// Validation failed.
    #[error("Share pack validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A membership list contradicts another membership list.
    #[error("Conflicting membership for {field} of '{owner}': {}", .values.join(", "))]
    ConflictingMembership {
        /// Resource that owns the membership lists.
        owner: String,
        /// Membership field (e.g. "assets", "recipients").
        field: String,
        /// Every value present in both lists.
        values: Vec<String>,
    },

    /// A change to an immutable field was requested.
    #[error("Cannot change immutable field {field} of {resource_type} '{name}'")]
    ImmutableField {
        /// Type of resource (recipient, share, pipeline).
        resource_type: String,
        /// Name of the resource.
        name: String,
        /// The immutable field.
        field: String,
    },

    /// A required field is missing.
    #[error("Missing required field {field} for {resource_type} '{name}'")]
    MissingField {
        /// Type of resource.
        resource_type: String,
        /// Name of the resource.
        name: String,
        /// The missing field.
        field: String,
    },

    /// Duplicate resource definition.
    #[error("Duplicate {resource_type} name: {name}")]
    DuplicateName {
        /// Type of resource.
        resource_type: String,
        /// The duplicated name.
        name: String,
    },
}

/// Remote sharing-platform errors.
///
/// Error kinds are structured; the platform client maps transport-level
/// responses onto them so no caller ever inspects message text.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The named resource does not exist on the platform.
    #[error("{resource_type} not found: {name}")]
    NotFound {
        /// Type of resource.
        resource_type: String,
        /// Name or id of the missing resource.
        name: String,
    },

    /// The resource already exists (conflict on create).
    #[error("{resource_type} already exists: {name}")]
    AlreadyExists {
        /// Type of resource.
        resource_type: String,
        /// Name of the conflicting resource.
        name: String,
    },

    /// The caller lacks permission for the operation.
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// Description from the platform.
        message: String,
    },

    /// The resource is in a state that forbids the operation.
    #[error("Invalid resource state: {message}")]
    InvalidState {
        /// Description from the platform.
        message: String,
    },

    /// Rate limited by the platform.
    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error communicating with the platform: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// API request failed with an unmapped status.
    #[error("Platform API request failed: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the platform.
        message: String,
    },

    /// Invalid response from the platform.
    #[error("Invalid response from the platform: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A newly shared asset has no known or discoverable pipeline.
    #[error("No pipeline covers newly shared assets of '{share}': {}", .assets.join(", "))]
    PipelineCoverage {
        /// The share whose assets are uncovered.
        share: String,
        /// Every uncovered asset.
        assets: Vec<String>,
    },

    /// Reconciliation failed for a specific resource.
    #[error("Failed to reconcile {resource_type} '{name}': {reason}")]
    ResourceFailed {
        /// Type of resource.
        resource_type: String,
        /// Name of the resource.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// The run was aborted.
    #[error("Run aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Persistence errors.
#[derive(Debug, Error)]
pub enum PersistError {
    /// No current version exists for the entity.
    #[error("No current version for entity {entity_id}")]
    EntityNotFound {
        /// Entity identifier.
        entity_id: Uuid,
    },

    /// The store is corrupted.
    #[error("Persistence store is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("Persistence serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
    },

    /// Backend storage error.
    #[error("Persistence storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },
}

/// Result type alias for sharepack operations.
pub type Result<T> = std::result::Result<T, SharePackError>;

impl SharePackError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Remote(RemoteError::RateLimited { .. } | RemoteError::Network { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Remote(RemoteError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            Self::Remote(RemoteError::Network { .. }) => Some(5),
            _ => None,
        }
    }

    /// Returns true if the error is a create-conflict the reconcilers recover
    /// from by re-fetching.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::AlreadyExists { .. }))
    }

    /// Returns true if the error is a not-found response.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::NotFound { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }

    /// Creates an immutable-field error.
    #[must_use]
    pub fn immutable(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::ImmutableField {
            resource_type: resource_type.into(),
            name: name.into(),
            field: field.into(),
        }
    }
}

impl RemoteError {
    /// Creates an API request error.
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Creates an already-exists error.
    #[must_use]
    pub fn already_exists(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl PersistError {
    /// Creates a storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}
