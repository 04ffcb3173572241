use thiserror::Error;

/// Failures returned by the store API.
///
/// `NotFound` is kept distinct from the catch-all `Sqlx` variant so callers
/// (the REST/gRPC handlers) can tell "nothing matched" from "the database is
/// unhappy" without matching on error text.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("interaction not found: {0}")]
    InteractionNotFound(String),

    #[error("request_id already exists: {0}")]
    DuplicateRequestId(String),

    #[error("session name already exists: {0}")]
    DuplicateSessionName(String),

    #[error("invalid import payload: {0}")]
    InvalidImport(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
