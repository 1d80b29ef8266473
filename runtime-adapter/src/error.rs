use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeAdapterError {
    #[error("docker daemon call failed: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("healthcheck probe failed: {0}")]
    Healthcheck(String),
    #[error("healthcheck timed out after {0:?}")]
    HealthcheckTimeout(std::time::Duration),
}

pub type RuntimeAdapterResult<T> = Result<T, RuntimeAdapterError>;

impl RuntimeAdapterError {
    /// `bollard` surfaces a 404/409 from the daemon as `DockerResponseServerError`;
    /// the adapter treats "already exists" / "not found" as success so every
    /// create/remove call is idempotent on retry, per spec.md §9 "Idempotent
    /// naming".
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            RuntimeAdapterError::Docker(bollard::errors::Error::DockerResponseServerError {
                status_code: 409,
                ..
            })
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RuntimeAdapterError::Docker(bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                ..
            })
        )
    }
}
