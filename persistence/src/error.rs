use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<PersistenceError> for zaneops_common::error::CoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(msg) => zaneops_common::error::CoreError::NotFound(msg),
            other => zaneops_common::error::CoreError::Database(other.to_string()),
        }
    }
}
