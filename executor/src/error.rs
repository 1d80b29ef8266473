use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Runtime(#[from] zaneops_runtime_adapter::RuntimeAdapterError),
    #[error(transparent)]
    Proxy(#[from] zaneops_proxy::ProxyClientError),
    #[error(transparent)]
    Persistence(#[from] zaneops_persistence::PersistenceError),
    #[error("builder error: {0}")]
    Builder(String),
    #[error(transparent)]
    GitAuth(#[from] zaneops_backends::GitAuthError),
    #[error("healthcheck timed out after {0:?}")]
    HealthcheckTimeout(std::time::Duration),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExecutorError> for zaneops_common::error::CoreError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Runtime(inner) => zaneops_common::error::CoreError::Runtime(inner.to_string()),
            ExecutorError::Proxy(inner) => zaneops_common::error::CoreError::Proxy(inner.to_string()),
            ExecutorError::Persistence(inner) => inner.into(),
            ExecutorError::Builder(msg) => zaneops_common::error::CoreError::Builder(msg),
            ExecutorError::GitAuth(inner) => zaneops_common::error::CoreError::Builder(inner.to_string()),
            ExecutorError::HealthcheckTimeout(timeout) => {
                zaneops_common::error::CoreError::HealthcheckTimeout(timeout)
            }
            ExecutorError::Io(err) => zaneops_common::error::CoreError::Runtime(err.to_string()),
        }
    }
}
