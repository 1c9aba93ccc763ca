use thiserror::Error;

/// Errors from the persistence adapters.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored id '{0}' is not a valid uuid")]
    InvalidId(String),

    #[error("stored timestamp '{0}' is not valid RFC3339")]
    InvalidTimestamp(String),

    #[error("stored JSON column failed to decode: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

/// Convenience result type for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;
