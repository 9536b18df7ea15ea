//! Error types for the Shortlink RBAC system.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ShortlinkError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate key: {entity} with key `{key}` already exists")]
    DuplicateKey { entity: String, key: String },

    #[error("Cyclic parent: role {parent_id} is role {role_id} or one of its descendants")]
    CyclicParent { role_id: Uuid, parent_id: Uuid },

    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A second row for the same (role, resource) pair. Upsert semantics
    /// make this an invariant violation when it surfaces.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Session expired, please log in again")]
    SessionExpired,

    #[error("A save is already in progress")]
    SaveInProgress,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShortlinkError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Errors that are recovered locally as inline form errors.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::DuplicateKey { .. } | Self::CyclicParent { .. }
        )
    }
}

pub type ShortlinkResult<T> = Result<T, ShortlinkError>;
