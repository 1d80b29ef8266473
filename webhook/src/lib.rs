//! Webhook Router (spec.md §4.6): verifies a provider's signature against
//! every registered [`GitApp`](zaneops_common::models::GitApp)'s secret,
//! parses the payload into a normalized event, and dispatches to push
//! handling or the PR/MR preview-environment lifecycle.

pub mod error;
pub mod events;
pub mod github;
pub mod gitlab;
pub mod preview;
pub mod push;
pub mod signature;

pub use error::WebhookError;
pub use events::{CommitInfo, PullRequestAction, PullRequestEvent, PushEvent};
pub use preview::{PreviewOutcome, ReviewDecision};

use serde_json::Value;
use tracing::instrument;

use zaneops_common::ids::{DeploymentId, EnvironmentId, ProjectId};
use zaneops_common::models::{GitApp, GitAppKind, ServiceSource};
use zaneops_persistence::{repo, Store};
use zaneops_planner::Planner;
use zaneops_proxy::ProxyControlPlane;
use zaneops_runtime_adapter::RuntimeAdapter;

/// What a single webhook delivery turned into.
#[derive(Debug)]
pub enum WebhookOutcome {
    Push(Vec<DeploymentId>),
    PullRequest(PreviewOutcome),
}

/// Owns everything a webhook delivery needs to authenticate itself and act
/// on it -- the webhook-facing counterpart to `executor::ExecutorCtx`.
#[derive(Clone)]
pub struct WebhookRouter {
    store: Store,
    planner: Planner,
    runtime: RuntimeAdapter,
    proxy: ProxyControlPlane,
}

impl WebhookRouter {
    pub fn new(store: Store, planner: Planner, runtime: RuntimeAdapter, proxy: ProxyControlPlane) -> Self {
        Self { store, planner, runtime, proxy }
    }

    /// Neither provider identifies which of a project's possibly many git
    /// apps sent a delivery, so every registered app of the right kind is
    /// tried against the signature until one matches.
    #[instrument(skip(self, body))]
    async fn authenticate(&self, kind: GitAppKind, signature_header: &str, body: &[u8]) -> Result<GitApp, WebhookError> {
        for app in repo::git_apps::all(self.store.pool()).await? {
            if app.kind != kind {
                continue;
            }
            let matches = match kind {
                GitAppKind::GitHub => signature::verify_github_signature(&app.webhook_secret, body, signature_header),
                GitAppKind::GitLab => signature::verify_gitlab_token(&app.webhook_secret, signature_header),
            };
            if matches {
                return Ok(app);
            }
        }
        Err(WebhookError::UnknownApp)
    }

    /// The project a PR/MR targets is whichever one has a Git-kind service
    /// tracking its base repository; sidecars and image-kind services
    /// never seed a preview so they're not candidates.
    async fn project_for_base_repository(&self, base_repository_url: &str) -> Result<ProjectId, WebhookError> {
        for service in repo::services::all(self.store.pool()).await? {
            if let ServiceSource::Git { repository_url, .. } = &service.source {
                if repository_url == base_repository_url {
                    return Ok(service.project_id);
                }
            }
        }
        Err(WebhookError::MalformedPayload(format!(
            "no service tracks repository {base_repository_url}"
        )))
    }

    /// Entry point for `POST /webhook/github`. `event_name` is GitHub's
    /// `X-GitHub-Event` header; `signature_header` is `X-Hub-Signature-256`.
    #[instrument(skip(self, body), fields(event_name))]
    pub async fn handle_github_delivery(
        &self,
        event_name: &str,
        signature_header: &str,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        let app = self.authenticate(GitAppKind::GitHub, signature_header, body).await?;
        let payload: Value = serde_json::from_slice(body).map_err(|err| WebhookError::MalformedPayload(err.to_string()))?;

        match event_name {
            "push" => {
                let queued = match github::parse_push(&payload)? {
                    Some(event) => push::handle_push(&self.store, &self.planner, app.id, &event).await?,
                    None => vec![],
                };
                Ok(WebhookOutcome::Push(queued))
            }
            "pull_request" => {
                let event = github::parse_pull_request(&payload)?;
                let project_id = self.project_for_base_repository(&event.base_repository_url).await?;
                let outcome = preview::handle_pull_request(
                    &self.store,
                    &self.planner,
                    &self.runtime,
                    &self.proxy,
                    project_id,
                    app.id,
                    &event,
                )
                .await?;
                Ok(WebhookOutcome::PullRequest(outcome))
            }
            other => Err(WebhookError::MalformedPayload(format!("unhandled GitHub event: {other}"))),
        }
    }

    /// Entry point for `POST /webhook/gitlab`. `event_name` is GitLab's
    /// `X-Gitlab-Event` header; `token_header` is `X-Gitlab-Token`.
    #[instrument(skip(self, body), fields(event_name))]
    pub async fn handle_gitlab_delivery(
        &self,
        event_name: &str,
        token_header: &str,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        let app = self.authenticate(GitAppKind::GitLab, token_header, body).await?;
        let payload: Value = serde_json::from_slice(body).map_err(|err| WebhookError::MalformedPayload(err.to_string()))?;

        match event_name {
            "Push Hook" => {
                let queued = match gitlab::parse_push(&payload)? {
                    Some(event) => push::handle_push(&self.store, &self.planner, app.id, &event).await?,
                    None => vec![],
                };
                Ok(WebhookOutcome::Push(queued))
            }
            "Merge Request Hook" => {
                let event = gitlab::parse_merge_request(&payload)?;
                let project_id = self.project_for_base_repository(&event.base_repository_url).await?;
                let outcome = preview::handle_pull_request(
                    &self.store,
                    &self.planner,
                    &self.runtime,
                    &self.proxy,
                    project_id,
                    app.id,
                    &event,
                )
                .await?;
                Ok(WebhookOutcome::PullRequest(outcome))
            }
            other => Err(WebhookError::MalformedPayload(format!("unhandled GitLab event: {other}"))),
        }
    }

    /// `POST /environments/<preview>/review_deploy` (spec.md §4.6).
    pub async fn review_deploy(
        &self,
        environment_id: EnvironmentId,
        decision: ReviewDecision,
    ) -> Result<PreviewOutcome, WebhookError> {
        preview::review_deploy(&self.store, &self.planner, &self.runtime, &self.proxy, environment_id, decision).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;
    use zaneops_common::ids::{ProjectId, ServiceId};
    use zaneops_common::models::{BuilderConfig, Environment, GitAppCredential, ResourceLimits, Service};

    struct NeverCalledResolver;

    #[async_trait::async_trait]
    impl zaneops_planner::GitRefResolver for NeverCalledResolver {
        async fn resolve_branch_head(
            &self,
            _repository_url: &str,
            _branch_name: &str,
            _auth_token: Option<&str>,
        ) -> Result<String, zaneops_planner::GitResolveError> {
            panic!("test pushes always carry a head_commit");
        }
    }

    async fn router_with_fixture() -> (WebhookRouter, String) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let (dispatch, _rx) = tokio::sync::mpsc::unbounded_channel();
        let planner = Planner::new(store.clone(), Arc::new(NeverCalledResolver), dispatch);
        let runtime = RuntimeAdapter::new(bollard::Docker::connect_with_local_defaults().unwrap());
        let proxy = ProxyControlPlane::new(zaneops_proxy::ProxyClient::new(reqwest::Client::new(), "http://127.0.0.1:0"));

        let secret = "topsecret".to_string();
        let app = GitApp {
            id: zaneops_common::ids::GitAppId::new(),
            kind: GitAppKind::GitHub,
            webhook_secret: secret.clone(),
            credential: GitAppCredential::GitHubInstallation {
                app_id: "1".into(),
                installation_id: "2".into(),
                private_key_pem: String::new(),
            },
        };

        let project = zaneops_common::models::Project {
            id: ProjectId::new(),
            slug: "acme".into(),
            created_at: Utc::now(),
        };
        let environment = Environment {
            id: zaneops_common::ids::EnvironmentId::new(),
            project_id: project.id,
            name: "production".into(),
            created_at: Utc::now(),
            preview_metadata: None,
        };
        let service = Service {
            id: ServiceId::new(),
            project_id: project.id,
            environment_id: environment.id,
            slug: "api".into(),
            unprefixed_id: "x".into(),
            source: ServiceSource::Git {
                repository_url: "https://github.com/acme/widgets.git".into(),
                branch_name: "main".into(),
                commit_sha: "0".repeat(40),
                git_app_id: Some(app.id),
                builder: BuilderConfig::Dockerfile {
                    dockerfile_path: "Dockerfile".into(),
                    build_context_dir: ".".into(),
                    build_stage_target: None,
                },
            },
            command: None,
            healthcheck: None,
            resource_limits: ResourceLimits::default(),
            volumes: vec![],
            configs: vec![],
            ports: vec![],
            urls: vec![],
            env_variables: vec![],
            deploy_token: "tok".into(),
            watch_paths: None,
            auto_deploy: true,
            current_production_deployment_id: None,
            created_at: Utc::now(),
        };

        let mut tx = store.begin().await.unwrap();
        repo::projects::upsert(tx.as_mut(), &project).await.unwrap();
        repo::environments::upsert(tx.as_mut(), &environment).await.unwrap();
        repo::services::upsert(tx.as_mut(), &service).await.unwrap();
        repo::git_apps::upsert(tx.as_mut(), &app).await.unwrap();
        tx.commit().await.unwrap();

        (WebhookRouter::new(store, planner, runtime, proxy), secret)
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret.as_bytes());
        let tag = ring::hmac::sign(&key, body);
        format!("sha256={}", tag.as_ref().iter().map(|b| format!("{b:02x}")).collect::<String>())
    }

    #[tokio::test]
    async fn a_push_with_a_bad_signature_is_rejected_before_parsing() {
        let (router, _secret) = router_with_fixture().await;
        let body = json!({"ref": "refs/heads/main"}).to_string();

        let result = router.handle_github_delivery("push", "sha256=deadbeef", body.as_bytes()).await;
        assert!(matches!(result, Err(WebhookError::UnknownApp)));
    }

    #[tokio::test]
    async fn a_correctly_signed_push_queues_a_deployment() {
        let (router, secret) = router_with_fixture().await;
        let body = json!({
            "ref": "refs/heads/main",
            "repository": {"clone_url": "https://github.com/acme/widgets.git"},
            "head_commit": {"id": "abc123", "message": "fix bug", "author": {"name": "Ada"}},
            "commits": [],
        })
        .to_string();
        let signature = sign(&secret, body.as_bytes());

        let outcome = router.handle_github_delivery("push", &signature, body.as_bytes()).await.unwrap();
        match outcome {
            WebhookOutcome::Push(queued) => assert_eq!(queued.len(), 1),
            other => panic!("expected a push outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn a_tag_push_produces_zero_deployments_not_an_error() {
        let (router, secret) = router_with_fixture().await;
        let body = json!({
            "ref": "refs/tags/v1.0.0",
            "repository": {"clone_url": "https://github.com/acme/widgets.git"},
        })
        .to_string();
        let signature = sign(&secret, body.as_bytes());

        let outcome = router.handle_github_delivery("push", &signature, body.as_bytes()).await.unwrap();
        match outcome {
            WebhookOutcome::Push(queued) => assert!(queued.is_empty()),
            other => panic!("expected a push outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn an_unhandled_event_name_is_a_malformed_payload_error() {
        let (router, secret) = router_with_fixture().await;
        let body = b"{}";
        let signature = sign(&secret, body);

        let result = router.handle_github_delivery("issues", &signature, body).await;
        assert!(matches!(result, Err(WebhookError::MalformedPayload(_))));
    }
}
