//! Thin HTTP client over the proxy admin API described in spec.md §6:
//! resources at `/id/<id>`, `GET`/`PUT`/`PATCH`/`DELETE`.

use reqwest::StatusCode;
use thiserror::Error;

use crate::route::RouteRecord;

#[derive(Debug, Error)]
pub enum ProxyClientError {
    #[error("proxy admin API call failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("proxy admin API returned unexpected status {0}")]
    UnexpectedStatus(StatusCode),
}

pub type ProxyClientResult<T> = Result<T, ProxyClientError>;

#[derive(Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    admin_base_url: String,
}

impl ProxyClient {
    pub fn new(http: reqwest::Client, admin_base_url: impl Into<String>) -> Self {
        Self {
            http,
            admin_base_url: admin_base_url.into(),
        }
    }

    fn url_for(&self, id: &str) -> String {
        format!("{}/id/{id}", self.admin_base_url.trim_end_matches('/'))
    }

    pub async fn get(&self, id: &str) -> ProxyClientResult<Option<RouteRecord>> {
        let response = self.http.get(self.url_for(id)).send().await?;
        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(ProxyClientError::UnexpectedStatus(status)),
        }
    }

    /// Create: `PUT` at the index, rejected if the id already has a route
    /// (callers use this only after confirming absence via `get`).
    pub async fn put(&self, record: &RouteRecord) -> ProxyClientResult<()> {
        let response = self
            .http
            .put(format!("{}/id", self.admin_base_url.trim_end_matches('/')))
            .json(record)
            .send()
            .await?;
        ensure_success(response).await
    }

    /// Update: `PATCH` replaces the record at the same id in place.
    pub async fn patch(&self, record: &RouteRecord) -> ProxyClientResult<()> {
        let response = self
            .http
            .patch(self.url_for(&record.id))
            .json(record)
            .send()
            .await?;
        ensure_success(response).await
    }

    /// `404` on delete is success per spec.md §4.5.
    pub async fn delete(&self, id: &str) -> ProxyClientResult<()> {
        let response = self.http.delete(self.url_for(id)).send().await?;
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(()),
            status => Err(ProxyClientError::UnexpectedStatus(status)),
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> ProxyClientResult<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(ProxyClientError::UnexpectedStatus(response.status()))
    }
}
