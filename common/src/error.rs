//! Error vocabulary shared by every crate in the orchestration core.
//!
//! Mirrors the error-kind taxonomy of the design: [`CoreError::Validation`]
//! and [`CoreError::Conflict`] are logical errors that propagate to the
//! request layer unchanged, while [`CoreError::Runtime`] / [`CoreError::Proxy`]
//! wrap retried external-call failures that the executor eventually turns
//! into a terminal deployment status.

use std::error::Error as StdError;

#[cfg(feature = "axum")]
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{ser::SerializeMap, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("proxy error: {0}")]
    Proxy(String),
    #[error("builder error: {0}")]
    Builder(String),
    #[error("healthcheck timed out after {0:?}")]
    HealthcheckTimeout(std::time::Duration),
    #[error("database error: {0}")]
    Database(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl Serialize for CoreError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", &format!("{:?}", self))?;
        map.serialize_entry(
            "msg",
            &self.source().map(ToString::to_string).unwrap_or_else(|| self.to_string()),
        )?;
        map.end()
    }
}

#[cfg(feature = "axum")]
impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let code = match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Runtime(_)
            | CoreError::Proxy(_)
            | CoreError::Builder(_)
            | CoreError::HealthcheckTimeout(_)
            | CoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            code,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
            Json(self),
        )
            .into_response()
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
