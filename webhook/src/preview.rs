//! Pull-request / merge-request preview environment lifecycle (spec.md
//! §4.6, "Pull request / Merge request"): provisioning on `opened`,
//! fast-forwarding on `synchronize`, metadata-only updates on `edited`,
//! and cascading teardown on `closed`/`merged` or a declined fork-approval
//! decision.

use chrono::Utc;
use tracing::{instrument, warn};

use zaneops_common::ids::{ConfigId, DeploymentId, EnvironmentId, GitAppId, ProjectId, ServiceId};
use zaneops_common::models::{
    Config, Environment, GitAppKind, PreviewDeployState, PreviewMetadata, ResourceLimits, Service,
    ServiceSource, SourceTrigger, TriggerMethod,
};
use zaneops_persistence::{repo, Store};
use zaneops_planner::{Planner, PrepareNewDeployment};
use zaneops_proxy::ProxyControlPlane;
use zaneops_runtime_adapter::RuntimeAdapter;

use crate::error::WebhookError;
use crate::events::{PullRequestAction, PullRequestEvent};

/// What happened as a result of routing one PR/MR event; mostly useful
/// for the webhook handler's HTTP response and for tests.
#[derive(Default, Debug)]
pub struct PreviewOutcome {
    pub environments_created: Vec<EnvironmentId>,
    pub environments_archived: Vec<EnvironmentId>,
    pub deployments_queued: Vec<DeploymentId>,
}

/// A decision submitted through `POST /environments/<preview>/review_deploy`
/// (spec.md §4.6, "Fork-approval protocol").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReviewDecision {
    Accept,
    Decline,
}

#[instrument(skip(store, planner, runtime, proxy, event), fields(pr = event.number))]
pub async fn handle_pull_request(
    store: &Store,
    planner: &Planner,
    runtime: &RuntimeAdapter,
    proxy: &ProxyControlPlane,
    project_id: ProjectId,
    git_app_id: GitAppId,
    event: &PullRequestEvent,
) -> Result<PreviewOutcome, WebhookError> {
    match event.action {
        PullRequestAction::Opened => open_previews(store, planner, project_id, git_app_id, event).await,
        PullRequestAction::Synchronize => synchronize_previews(store, planner, git_app_id, event).await,
        PullRequestAction::Edited => {
            update_preview_titles(store, git_app_id, event).await?;
            Ok(PreviewOutcome::default())
        }
        PullRequestAction::Closed => {
            let previews = matching_previews(store, git_app_id, event).await?;
            let mut outcome = PreviewOutcome::default();
            for env in previews {
                archive_environment(store, runtime, proxy, env.id).await?;
                outcome.environments_archived.push(env.id);
            }
            Ok(outcome)
        }
    }
}

/// Finds every open preview environment already tracking this PR/MR,
/// scoped to the same git app and base repository (spec.md §4.6's
/// idempotency guarantee: "reopening produces no new environment").
async fn matching_previews(
    store: &Store,
    git_app_id: GitAppId,
    event: &PullRequestEvent,
) -> Result<Vec<Environment>, WebhookError> {
    let previews = repo::environments::all_previews(store.pool()).await?;
    Ok(previews
        .into_iter()
        .filter(|env| {
            env.preview_metadata.as_ref().is_some_and(|metadata| {
                metadata.git_app_id == Some(git_app_id)
                    && metadata.pr_number == Some(event.number)
                    && metadata.base_repository_url == event.base_repository_url
            })
        })
        .collect())
}

/// Services eligible to seed a preview: git-kind, owned by this git app,
/// tracking the PR's base repository, and living in the (non-preview)
/// environment the PR targets.
async fn matching_source_services(
    store: &Store,
    git_app_id: GitAppId,
    base_repository_url: &str,
) -> Result<Vec<Service>, WebhookError> {
    let mut matched = Vec::new();
    for service in repo::services::all(store.pool()).await? {
        let is_match = matches!(
            &service.source,
            ServiceSource::Git { repository_url, git_app_id: svc_app_id, .. }
                if *svc_app_id == Some(git_app_id) && repository_url == base_repository_url
        );
        if !is_match {
            continue;
        }
        let environment = repo::environments::fetch(store.pool(), service.environment_id).await?;
        if !environment.is_preview() {
            matched.push(service);
        }
    }
    Ok(matched)
}

#[instrument(skip(store, planner, event))]
async fn open_previews(
    store: &Store,
    planner: &Planner,
    project_id: ProjectId,
    git_app_id: GitAppId,
    event: &PullRequestEvent,
) -> Result<PreviewOutcome, WebhookError> {
    let mut outcome = PreviewOutcome::default();

    if !matching_previews(store, git_app_id, event).await?.is_empty() {
        // Reopening an already-previewed PR is a no-op (spec.md §4.6).
        return Ok(outcome);
    }

    let git_app = repo::git_apps::fetch(store.pool(), git_app_id).await?;
    let is_fork = event.head_repository_url != event.base_repository_url;

    for source_service in matching_source_services(store, git_app_id, &event.base_repository_url).await? {
        let Some(template) = repo::preview_templates::default_for_project(store.pool(), project_id).await? else {
            warn!(service_id = %source_service.id, "no default preview template for project, skipping");
            continue;
        };

        let environment_name = unique_preview_environment_name(
            store,
            project_id,
            git_app.kind,
            event.number,
            &source_service.slug,
        )
        .await?;

        let environment_id = EnvironmentId::new();
        let deploy_state = if is_fork {
            PreviewDeployState::Pending
        } else {
            PreviewDeployState::Approved
        };

        let preview_metadata = PreviewMetadata {
            environment_id,
            source_trigger: SourceTrigger::PullRequest,
            pr_number: Some(event.number),
            pr_title: Some(event.title.clone()),
            branch_name: event.branch_name.clone(),
            head_repository_url: event.head_repository_url.clone(),
            base_repository_url: event.base_repository_url.clone(),
            commit_sha: event.commit_sha.clone(),
            deploy_state,
            template_id: template.id,
            git_app_id: Some(git_app_id),
            source_service_id: source_service.id,
        };

        let environment = Environment {
            id: environment_id,
            project_id,
            name: environment_name,
            created_at: Utc::now(),
            preview_metadata: Some(preview_metadata),
        };

        let cloned_primary = clone_service_into_preview(&source_service, environment_id, event, git_app_id);
        let sidecars: Vec<Service> = template
            .sidecars
            .iter()
            .map(|blueprint| sidecar_service(blueprint, project_id, environment_id))
            .collect();

        let mut tx = store.begin().await?;
        repo::environments::upsert(tx.as_mut(), &environment).await?;
        repo::services::upsert(tx.as_mut(), &cloned_primary).await?;
        for sidecar in &sidecars {
            repo::services::upsert(tx.as_mut(), sidecar).await?;
        }
        tx.commit().await?;
        outcome.environments_created.push(environment_id);

        if deploy_state == PreviewDeployState::Approved {
            for mut service in std::iter::once(cloned_primary).chain(sidecars) {
                let deployment = planner
                    .prepare_new_deployment(
                        &mut service,
                        vec![],
                        PrepareNewDeployment {
                            commit_message: None,
                            commit_author_name: None,
                            trigger_method: TriggerMethod::Auto,
                            is_redeploy_of: None,
                            ignore_build_cache: false,
                        },
                        None,
                    )
                    .await?;
                outcome.deployments_queued.push(deployment.id);
            }
        }
    }

    Ok(outcome)
}

#[instrument(skip(store, planner, event))]
async fn synchronize_previews(
    store: &Store,
    planner: &Planner,
    git_app_id: GitAppId,
    event: &PullRequestEvent,
) -> Result<PreviewOutcome, WebhookError> {
    let mut outcome = PreviewOutcome::default();

    for mut environment in matching_previews(store, git_app_id, event).await? {
        let Some(metadata) = environment.preview_metadata.as_mut() else {
            continue;
        };
        metadata.commit_sha = event.commit_sha.clone();
        let approved = metadata.deploy_state == PreviewDeployState::Approved;

        let mut tx = store.begin().await?;
        repo::environments::upsert(tx.as_mut(), &environment).await?;
        tx.commit().await?;

        if !approved {
            // PENDING previews only get their metadata refreshed (spec.md
            // §4.6); nothing redeploys until a fork-approval decision.
            continue;
        }

        for mut service in repo::services::for_environment(store.pool(), environment.id).await? {
            if let ServiceSource::Git { commit_sha, .. } = &mut service.source {
                *commit_sha = event.commit_sha.clone();
            } else {
                // Sidecars don't track the PR head; only the cloned
                // git-sourced service needs redeploying on a new push.
                continue;
            }

            let pending = repo::deployment_changes::pending_for_service(store.pool(), service.id).await?;
            let deployment = planner
                .prepare_new_deployment(
                    &mut service,
                    pending,
                    PrepareNewDeployment {
                        commit_message: None,
                        commit_author_name: None,
                        trigger_method: TriggerMethod::Auto,
                        is_redeploy_of: None,
                        ignore_build_cache: false,
                    },
                    None,
                )
                .await?;
            outcome.deployments_queued.push(deployment.id);
        }
    }

    Ok(outcome)
}

async fn update_preview_titles(
    store: &Store,
    git_app_id: GitAppId,
    event: &PullRequestEvent,
) -> Result<(), WebhookError> {
    for mut environment in matching_previews(store, git_app_id, event).await? {
        if let Some(metadata) = environment.preview_metadata.as_mut() {
            metadata.pr_title = Some(event.title.clone());
        }
        let mut tx = store.begin().await?;
        repo::environments::upsert(tx.as_mut(), &environment).await?;
        tx.commit().await?;
    }
    Ok(())
}

/// `POST /environments/<preview>/review_deploy` (spec.md §4.6, "Fork-approval
/// protocol"): ACCEPT flips the environment to `APPROVED` and deploys every
/// service it owns; DECLINE tears it down via the same path as a closed PR.
#[instrument(skip(store, planner, runtime, proxy))]
pub async fn review_deploy(
    store: &Store,
    planner: &Planner,
    runtime: &RuntimeAdapter,
    proxy: &ProxyControlPlane,
    environment_id: EnvironmentId,
    decision: ReviewDecision,
) -> Result<PreviewOutcome, WebhookError> {
    let mut outcome = PreviewOutcome::default();
    let mut environment = repo::environments::fetch(store.pool(), environment_id).await?;

    match decision {
        ReviewDecision::Decline => {
            archive_environment(store, runtime, proxy, environment_id).await?;
            outcome.environments_archived.push(environment_id);
        }
        ReviewDecision::Accept => {
            if let Some(metadata) = environment.preview_metadata.as_mut() {
                metadata.deploy_state = PreviewDeployState::Approved;
            }
            let mut tx = store.begin().await?;
            repo::environments::upsert(tx.as_mut(), &environment).await?;
            tx.commit().await?;

            for mut service in repo::services::for_environment(store.pool(), environment_id).await? {
                let pending = repo::deployment_changes::pending_for_service(store.pool(), service.id).await?;
                let deployment = planner
                    .prepare_new_deployment(
                        &mut service,
                        pending,
                        PrepareNewDeployment {
                            commit_message: None,
                            commit_author_name: None,
                            trigger_method: TriggerMethod::Auto,
                            is_redeploy_of: None,
                            ignore_build_cache: false,
                        },
                        None,
                    )
                    .await?;
                outcome.deployments_queued.push(deployment.id);
            }
        }
    }

    Ok(outcome)
}

/// Cascade-removes a preview environment: every deployment's runtime
/// service and `deployment:*` proxy routes, every service's `service:*`
/// routes and runtime-managed volumes/configs, then the service and
/// environment rows themselves. The project's shared overlay network is
/// left in place -- spec.md §5 scopes network removal to project
/// archival, not per-environment cleanup.
#[instrument(skip(store, runtime, proxy))]
pub async fn archive_environment(
    store: &Store,
    runtime: &RuntimeAdapter,
    proxy: &ProxyControlPlane,
    environment_id: EnvironmentId,
) -> Result<(), WebhookError> {
    let environment = repo::environments::fetch(store.pool(), environment_id).await?;
    let project = repo::projects::fetch(store.pool(), environment.project_id).await?;

    for service in repo::services::for_environment(store.pool(), environment.id).await? {
        let is_git = matches!(service.source, ServiceSource::Git { .. });

        for deployment in repo::deployments::for_service(store.pool(), service.id).await? {
            let runtime_name = deployment.runtime_service_name(&project.slug, &service.slug, is_git);
            runtime.remove_service(&runtime_name).await?;

            for url in repo::deployment_urls::for_deployment(store.pool(), deployment.id).await? {
                proxy.remove_deployment_route(&deployment, &url).await?;
            }

            let mut tx = store.begin().await?;
            repo::deployment_urls::delete_for_deployment(tx.as_mut(), deployment.id).await?;
            repo::deployments::delete(tx.as_mut(), deployment.id).await?;
            tx.commit().await?;
        }

        for url in &service.urls {
            proxy.remove_service_route(url).await?;
        }
        for volume in &service.volumes {
            if volume.host_path.is_none() {
                runtime.remove_volume(&volume.resource_name(&project.slug)).await?;
            }
        }
        for config in &service.configs {
            runtime.remove_config(&config.resource_name(&project.slug)).await?;
        }

        let mut tx = store.begin().await?;
        for change in repo::deployment_changes::all_for_service(store.pool(), service.id).await? {
            repo::deployment_changes::delete(tx.as_mut(), change.id).await?;
        }
        repo::services::delete(tx.as_mut(), service.id).await?;
        tx.commit().await?;
    }

    let mut tx = store.begin().await?;
    repo::environments::delete(tx.as_mut(), environment.id).await?;
    tx.commit().await?;

    Ok(())
}

async fn unique_preview_environment_name(
    store: &Store,
    project_id: ProjectId,
    git_app_kind: GitAppKind,
    pr_number: u64,
    service_slug: &str,
) -> Result<String, WebhookError> {
    let word = match git_app_kind {
        GitAppKind::GitHub => "pr",
        GitAppKind::GitLab => "mr",
    };
    let base_name = format!("preview-{word}-{pr_number}-{service_slug}");

    let existing = repo::environments::for_project(store.pool(), project_id).await?;
    if existing.iter().all(|env| env.name != base_name) {
        return Ok(base_name);
    }

    let suffix = ulid::Ulid::new().to_string().to_lowercase();
    Ok(format!("{base_name}-{}", &suffix[..4]))
}

fn clone_service_into_preview(
    source: &Service,
    environment_id: EnvironmentId,
    event: &PullRequestEvent,
    git_app_id: GitAppId,
) -> Service {
    let builder = match &source.source {
        ServiceSource::Git { builder, .. } => builder.clone(),
        ServiceSource::Image { .. } => unreachable!("matching_source_services only returns git-kind services"),
    };

    let id = ServiceId::new();

    Service {
        id,
        project_id: source.project_id,
        environment_id,
        slug: source.slug.clone(),
        unprefixed_id: new_unprefixed_id(),
        source: ServiceSource::Git {
            repository_url: event.head_repository_url.clone(),
            branch_name: event.branch_name.clone(),
            commit_sha: event.commit_sha.clone(),
            git_app_id: Some(git_app_id),
            builder,
        },
        command: source.command.clone(),
        healthcheck: source.healthcheck.clone(),
        resource_limits: source.resource_limits,
        // Preview environments are throwaway; persistent volumes and
        // publicly routable URLs stay behind on the production service to
        // avoid host_path collisions and (domain, base_path) conflicts.
        volumes: vec![],
        configs: clone_configs(&source.configs, id),
        ports: source.ports.clone(),
        urls: vec![],
        env_variables: source.env_variables.clone(),
        deploy_token: new_deploy_token(),
        watch_paths: source.watch_paths.clone(),
        auto_deploy: true,
        current_production_deployment_id: None,
        created_at: Utc::now(),
    }
}

fn clone_configs(configs: &[Config], service_id: ServiceId) -> Vec<Config> {
    configs
        .iter()
        .map(|config| Config {
            id: ConfigId::new(),
            service_id,
            name: config.name.clone(),
            contents: config.contents.clone(),
            mount_path: config.mount_path.clone(),
        })
        .collect()
}

fn sidecar_service(
    blueprint: &zaneops_common::models::SidecarBlueprint,
    project_id: ProjectId,
    environment_id: EnvironmentId,
) -> Service {
    Service {
        id: ServiceId::new(),
        project_id,
        environment_id,
        slug: blueprint.slug.clone(),
        unprefixed_id: new_unprefixed_id(),
        source: ServiceSource::Image {
            image: blueprint.image.clone(),
            credentials: None,
        },
        command: None,
        healthcheck: None,
        resource_limits: ResourceLimits::default(),
        volumes: vec![],
        configs: vec![],
        ports: vec![],
        urls: vec![],
        env_variables: blueprint.env_variables.clone(),
        deploy_token: new_deploy_token(),
        watch_paths: None,
        auto_deploy: false,
        current_production_deployment_id: None,
        created_at: Utc::now(),
    }
}

fn new_unprefixed_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()[..10].to_string()
}

fn new_deploy_token() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use zaneops_common::ids::PreviewTemplateId;
    use zaneops_common::models::{BuilderConfig, GitAppCredential, PreviewTemplate, SidecarBlueprint};

    struct NeverCalledResolver;

    #[async_trait]
    impl zaneops_planner::GitRefResolver for NeverCalledResolver {
        async fn resolve_branch_head(
            &self,
            _repository_url: &str,
            _branch_name: &str,
            _auth_token: Option<&str>,
        ) -> Result<String, zaneops_planner::GitResolveError> {
            panic!("preview commit_sha is always resolved, never HEAD");
        }
    }

    fn git_app() -> zaneops_common::models::GitApp {
        zaneops_common::models::GitApp {
            id: GitAppId::new(),
            kind: GitAppKind::GitHub,
            webhook_secret: "shh".into(),
            credential: GitAppCredential::GitHubInstallation {
                app_id: "1".into(),
                installation_id: "2".into(),
                private_key_pem: String::new(),
            },
        }
    }

    fn source_service(project_id: ProjectId, environment_id: EnvironmentId, git_app_id: GitAppId) -> Service {
        Service {
            id: ServiceId::new(),
            project_id,
            environment_id,
            slug: "api".into(),
            unprefixed_id: "src".into(),
            source: ServiceSource::Git {
                repository_url: "https://github.com/acme/widgets.git".into(),
                branch_name: "main".into(),
                commit_sha: "deadbeef".repeat(5)[..40].to_string(),
                git_app_id: Some(git_app_id),
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
        }
    }

    fn pr_event(head_repo: &str, base_repo: &str) -> PullRequestEvent {
        PullRequestEvent {
            action: PullRequestAction::Opened,
            number: 42,
            title: "Add feature".into(),
            head_repository_url: head_repo.into(),
            base_repository_url: base_repo.into(),
            branch_name: "feature".into(),
            commit_sha: "cafebabe".repeat(5)[..40].to_string(),
            merged: false,
        }
    }

    async fn setup() -> (Store, Planner, ProjectId, GitAppId) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let (dispatch, _rx) = tokio::sync::mpsc::unbounded_channel();
        let planner = Planner::new(store.clone(), Arc::new(NeverCalledResolver), dispatch);

        let project = zaneops_common::models::Project {
            id: ProjectId::new(),
            slug: "acme".into(),
            created_at: Utc::now(),
        };
        let prod_env = Environment {
            id: EnvironmentId::new(),
            project_id: project.id,
            name: "production".into(),
            created_at: Utc::now(),
            preview_metadata: None,
        };
        let app = git_app();
        let service = source_service(project.id, prod_env.id, app.id);

        let template = PreviewTemplate {
            id: PreviewTemplateId::new(),
            project_id: project.id,
            name: "default".into(),
            sidecars: vec![SidecarBlueprint {
                slug: "cache".into(),
                image: "redis:alpine".into(),
                env_variables: vec![],
            }],
        };

        let mut tx = store.begin().await.unwrap();
        repo::projects::upsert(tx.as_mut(), &project).await.unwrap();
        repo::environments::upsert(tx.as_mut(), &prod_env).await.unwrap();
        repo::services::upsert(tx.as_mut(), &service).await.unwrap();
        repo::git_apps::upsert(tx.as_mut(), &app).await.unwrap();
        repo::preview_templates::upsert(tx.as_mut(), &template).await.unwrap();
        tx.commit().await.unwrap();

        (store, planner, project.id, app.id)
    }

    #[tokio::test]
    async fn a_fork_pr_creates_a_pending_preview_with_zero_deployments() {
        let (store, planner, project_id, git_app_id) = setup().await;
        let event = pr_event("https://github.com/fork/widgets.git", "https://github.com/acme/widgets.git");

        let outcome = open_previews(&store, &planner, project_id, git_app_id, &event).await.unwrap();

        assert_eq!(outcome.environments_created.len(), 1);
        assert!(outcome.deployments_queued.is_empty());

        let env = repo::environments::fetch(store.pool(), outcome.environments_created[0]).await.unwrap();
        let metadata = env.preview_metadata.unwrap();
        assert_eq!(metadata.deploy_state, PreviewDeployState::Pending);
    }

    #[tokio::test]
    async fn a_same_repo_pr_is_approved_and_deploys_immediately() {
        let (store, planner, project_id, git_app_id) = setup().await;
        let event = pr_event("https://github.com/acme/widgets.git", "https://github.com/acme/widgets.git");

        let outcome = open_previews(&store, &planner, project_id, git_app_id, &event).await.unwrap();

        assert_eq!(outcome.environments_created.len(), 1);
        // Primary cloned service + the one sidecar from the template.
        assert_eq!(outcome.deployments_queued.len(), 2);
    }

    #[tokio::test]
    async fn reopening_an_already_previewed_pr_creates_nothing_new() {
        let (store, planner, project_id, git_app_id) = setup().await;
        let event = pr_event("https://github.com/fork/widgets.git", "https://github.com/acme/widgets.git");

        let first = open_previews(&store, &planner, project_id, git_app_id, &event).await.unwrap();
        assert_eq!(first.environments_created.len(), 1);

        let second = open_previews(&store, &planner, project_id, git_app_id, &event).await.unwrap();
        assert!(second.environments_created.is_empty());
    }

    /// Accept never touches the runtime or proxy, so a lazily-constructed
    /// client (no daemon/admin server actually reachable) is fine here.
    fn unused_runtime_and_proxy() -> (RuntimeAdapter, ProxyControlPlane) {
        let runtime = RuntimeAdapter::new(bollard::Docker::connect_with_local_defaults().unwrap());
        let proxy = ProxyControlPlane::new(zaneops_proxy::ProxyClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:0",
        ));
        (runtime, proxy)
    }

    #[tokio::test]
    async fn accepting_a_pending_preview_approves_and_deploys_every_service() {
        let (store, planner, project_id, git_app_id) = setup().await;
        let event = pr_event("https://github.com/fork/widgets.git", "https://github.com/acme/widgets.git");
        let opened = open_previews(&store, &planner, project_id, git_app_id, &event).await.unwrap();
        let environment_id = opened.environments_created[0];
        let (runtime, proxy) = unused_runtime_and_proxy();

        let outcome = review_deploy(&store, &planner, &runtime, &proxy, environment_id, ReviewDecision::Accept)
            .await
            .unwrap();
        assert_eq!(outcome.deployments_queued.len(), 2);

        let env = repo::environments::fetch(store.pool(), environment_id).await.unwrap();
        assert_eq!(env.preview_metadata.unwrap().deploy_state, PreviewDeployState::Approved);
    }
}
