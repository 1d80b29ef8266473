//! The Proxy Control-Plane (spec.md §4.5): installs, updates, and removes
//! routes with at-most-one-route-per-id semantics, idempotent on retry.

use tracing::instrument;
use zaneops_backends::retry::{retry_with_backoff, RetryConfig};
use zaneops_common::models::{Deployment, DeploymentUrl, Slot, Url};

use crate::client::{ProxyClient, ProxyClientResult};
use crate::route::RouteRecord;

#[derive(Clone)]
pub struct ProxyControlPlane {
    client: ProxyClient,
    retry: RetryConfig,
}

impl ProxyControlPlane {
    pub fn new(client: ProxyClient) -> Self {
        Self {
            client,
            retry: RetryConfig::default(),
        }
    }

    /// Installs (or replaces) the `deployment:<hash>:<port>` route so the
    /// candidate can be observed pre-promotion. Always a PUT-or-PATCH: a
    /// retried executor step may find the route already there from its own
    /// prior attempt.
    #[instrument(skip(self))]
    pub async fn expose_deployment(
        &self,
        deployment: &Deployment,
        url: &DeploymentUrl,
    ) -> ProxyClientResult<()> {
        let record = RouteRecord::for_deployment_url(deployment, url);
        self.upsert(record).await
    }

    /// Installs or updates the `service:<service.id>:<url.id>` route.
    /// Called once at `SERVICE_EXPOSED_TO_HTTP` with the *new* deployment's
    /// slot; the previous slot's route entry for the same id is naturally
    /// superseded since both share the same id.
    #[instrument(skip(self))]
    pub async fn expose_service(&self, url: &Url, slot: Slot) -> ProxyClientResult<()> {
        let record = RouteRecord::for_service_url(url, slot);
        self.upsert(record).await
    }

    /// The promotion step: PATCHes `upstreams[0].dial` from the old slot
    /// alias to the new one, leaving match conditions and middleware
    /// untouched so in-flight connections still see a consistent rule
    /// (spec.md §4.5, "Upstream rewrite only"). A no-op if the route
    /// already dials the target slot (idempotent retry after a crash
    /// between PATCH and step-marker persistence).
    #[instrument(skip(self))]
    pub async fn promote(&self, url: &Url, new_slot: Slot) -> ProxyClientResult<()> {
        let target_dial = format!("{}:{}", new_slot.internal_alias(), url.associated_port);

        let existing = retry_with_backoff(self.retry, || self.client.get(&url.route_id())).await?;

        match existing {
            Some(record) if record.current_dial() == Some(target_dial.as_str()) => Ok(()),
            Some(record) => {
                let updated = record.with_dial(&target_dial);
                retry_with_backoff(self.retry, || self.client.patch(&updated)).await
            }
            None => {
                let record = RouteRecord::for_service_url(url, new_slot);
                retry_with_backoff(self.retry, || self.client.put(&record)).await
            }
        }
    }

    /// Removes a `deployment:*` route; safe to call unconditionally since
    /// `delete` is idempotent (404 is success).
    #[instrument(skip(self))]
    pub async fn remove_deployment_route(
        &self,
        deployment: &Deployment,
        url: &DeploymentUrl,
    ) -> ProxyClientResult<()> {
        retry_with_backoff(self.retry, || self.client.delete(&url.route_id(&deployment.hash)))
            .await
    }

    /// Removes a `service:*` route. The executor only calls this when no
    /// remaining URL references the superseded slot (spec.md §4.4,
    /// "Promotion and teardown").
    #[instrument(skip(self))]
    pub async fn remove_service_route(&self, url: &Url) -> ProxyClientResult<()> {
        retry_with_backoff(self.retry, || self.client.delete(&url.route_id())).await
    }

    async fn upsert(&self, record: RouteRecord) -> ProxyClientResult<()> {
        let existing = retry_with_backoff(self.retry, || self.client.get(&record.id)).await?;
        match existing {
            Some(_) => retry_with_backoff(self.retry, || self.client.patch(&record)).await,
            None => retry_with_backoff(self.retry, || self.client.put(&record)).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use zaneops_common::ids::{DeploymentId, ServiceId, UrlId};
    use zaneops_common::models::{Deployment, DeploymentStatus, TriggerMethod};

    fn deployment() -> Deployment {
        Deployment {
            id: DeploymentId::new(),
            service_id: ServiceId::new(),
            hash: "abcd1234".into(),
            workflow_id: "wf".into(),
            slot: Slot::Green,
            status: DeploymentStatus::Starting,
            service_snapshot: serde_json::json!({}),
            commit_sha: None,
            commit_message: None,
            commit_author_name: None,
            trigger_method: TriggerMethod::Manual,
            is_redeploy_of: None,
            is_current_production: false,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            status_reason: None,
            ignore_build_cache: false,
            last_completed_step: None,
        }
    }

    fn url(service_id: ServiceId) -> Url {
        Url {
            id: UrlId::new(),
            service_id,
            domain: "cache.example.com".into(),
            base_path: "/".into(),
            strip_prefix: false,
            associated_port: 6379,
        }
    }

    #[tokio::test]
    async fn promote_patches_existing_route_to_new_slot() {
        let server = MockServer::start().await;
        let dep = deployment();
        let u = url(dep.service_id);
        let existing = RouteRecord::for_service_url(&u, Slot::Blue);

        Mock::given(method("GET"))
            .and(path(format!("/id/{}", u.route_id())))
            .respond_with(ResponseTemplate::new(200).set_body_json(&existing))
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path(format!("/id/{}", u.route_id())))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let control_plane = ProxyControlPlane::new(ProxyClient::new(reqwest::Client::new(), server.uri()));
        control_plane.promote(&u, Slot::Green).await.unwrap();
    }

    #[tokio::test]
    async fn promote_is_noop_when_already_pointed_at_target_slot() {
        let server = MockServer::start().await;
        let dep = deployment();
        let u = url(dep.service_id);
        let existing = RouteRecord::for_service_url(&u, Slot::Green);

        Mock::given(method("GET"))
            .and(path(format!("/id/{}", u.route_id())))
            .respond_with(ResponseTemplate::new(200).set_body_json(&existing))
            .mount(&server)
            .await;
        // No PATCH mock registered: any PATCH call would fail the test.

        let control_plane = ProxyControlPlane::new(ProxyClient::new(reqwest::Client::new(), server.uri()));
        control_plane.promote(&u, Slot::Green).await.unwrap();
    }

    #[tokio::test]
    async fn remove_service_route_tolerates_404() {
        let server = MockServer::start().await;
        let u = url(ServiceId::new());

        Mock::given(method("DELETE"))
            .and(path(format!("/id/{}", u.route_id())))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let control_plane = ProxyControlPlane::new(ProxyClient::new(reqwest::Client::new(), server.uri()));
        control_plane.remove_service_route(&u).await.unwrap();
    }
}
