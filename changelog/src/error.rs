use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChangeLogError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<ChangeLogError> for zaneops_common::error::CoreError {
    fn from(err: ChangeLogError) -> Self {
        match err {
            ChangeLogError::Validation(msg) => zaneops_common::error::CoreError::Validation(msg),
            ChangeLogError::Conflict(msg) => zaneops_common::error::CoreError::Conflict(msg),
            ChangeLogError::NotFound(msg) => zaneops_common::error::CoreError::NotFound(msg),
        }
    }
}
