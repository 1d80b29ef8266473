use thiserror::Error;

#[derive(Debug, Error)]
pub enum CancellationError {
    #[error(transparent)]
    Persistence(#[from] zaneops_persistence::PersistenceError),
    #[error("deployment is already in a terminal state")]
    AlreadyTerminal,
    #[error("deployment is already cancelling")]
    AlreadyCancelling,
}

impl From<CancellationError> for zaneops_common::error::CoreError {
    fn from(err: CancellationError) -> Self {
        match err {
            CancellationError::Persistence(inner) => inner.into(),
            CancellationError::AlreadyTerminal | CancellationError::AlreadyCancelling => {
                zaneops_common::error::CoreError::conflict(err.to_string())
            }
        }
    }
}
