use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    ChangeLog(#[from] zaneops_changelog::ChangeLogError),
    #[error(transparent)]
    Persistence(#[from] zaneops_persistence::PersistenceError),
}

impl From<PlannerError> for zaneops_common::error::CoreError {
    fn from(err: PlannerError) -> Self {
        match err {
            PlannerError::ChangeLog(inner) => inner.into(),
            PlannerError::Persistence(inner) => inner.into(),
        }
    }
}
