//! Database-specific error types and conversions.

use shortlink_core::error::ShortlinkError;
use uuid::Uuid;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// A stored row that does not decode into a domain value.
    #[error("Invalid {entity} record: {message}")]
    InvalidRecord { entity: String, message: String },
}

impl DbError {
    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }
}

impl From<DbError> for ShortlinkError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ShortlinkError::NotFound { entity, id },
            other => ShortlinkError::Database(other.to_string()),
        }
    }
}

/// Parse a UUID stored as a string field.
pub(crate) fn parse_uuid(entity: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::InvalidRecord {
        entity: entity.into(),
        message: format!("invalid UUID `{value}`: {e}"),
    })
}

/// Whether a failed statement violated the named unique index.
pub(crate) fn violates_index(err: &surrealdb::Error, index: &str) -> bool {
    err.to_string().contains(index)
}

/// Whether a write lost a transaction conflict and may simply be re-run.
pub(crate) fn is_retryable(err: &surrealdb::Error) -> bool {
    let message = err.to_string();
    message.contains("can be retried") || message.contains("write conflict")
}
