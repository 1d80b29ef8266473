use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("no git app matches this webhook's signature")]
    UnknownApp,
    #[error("signature verification failed")]
    BadSignature,
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    Persistence(#[from] zaneops_persistence::PersistenceError),
    #[error(transparent)]
    ChangeLog(#[from] zaneops_changelog::ChangeLogError),
    #[error(transparent)]
    Planner(#[from] zaneops_planner::PlannerError),
    #[error("no default preview template configured for this project")]
    NoPreviewTemplate,
    #[error(transparent)]
    Runtime(#[from] zaneops_runtime_adapter::RuntimeAdapterError),
    #[error(transparent)]
    Proxy(#[from] zaneops_proxy::ProxyClientError),
}

impl From<WebhookError> for zaneops_common::error::CoreError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::UnknownApp | WebhookError::BadSignature => {
                zaneops_common::error::CoreError::validation(err.to_string())
            }
            WebhookError::MalformedPayload(msg) => zaneops_common::error::CoreError::Validation(msg),
            WebhookError::Persistence(inner) => inner.into(),
            WebhookError::ChangeLog(inner) => inner.into(),
            WebhookError::Planner(inner) => inner.into(),
            WebhookError::NoPreviewTemplate => {
                zaneops_common::error::CoreError::validation(err.to_string())
            }
            WebhookError::Runtime(inner) => zaneops_common::error::CoreError::Runtime(inner.to_string()),
            WebhookError::Proxy(inner) => zaneops_common::error::CoreError::Proxy(inner.to_string()),
        }
    }
}
