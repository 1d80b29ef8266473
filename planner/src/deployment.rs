//! Deployment Planner (spec.md §4.3): `prepare_new_deployment` turns a
//! service plus its pending change queue into a queued [`Deployment`],
//! inside one transaction, with the Executor hand-off deferred to an
//! `on_commit` hook.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use zaneops_changelog::apply_pending_changes;
use zaneops_common::ids::{DeploymentId, DeploymentUrlId};
use zaneops_common::models::{
    Deployment, DeploymentChange, DeploymentStatus, DeploymentUrl, Service, ServiceSource, Slot,
    TriggerMethod,
};
use zaneops_persistence::{repo, Store};

use crate::error::PlannerError;
use crate::git::GitRefResolver;

pub struct PrepareNewDeployment {
    pub commit_message: Option<String>,
    pub commit_author_name: Option<String>,
    pub trigger_method: TriggerMethod,
    pub is_redeploy_of: Option<DeploymentId>,
    pub ignore_build_cache: bool,
}

#[derive(Clone)]
pub struct Planner {
    store: Store,
    git: Arc<dyn GitRefResolver>,
    dispatch: UnboundedSender<DeploymentId>,
}

impl Planner {
    pub fn new(store: Store, git: Arc<dyn GitRefResolver>, dispatch: UnboundedSender<DeploymentId>) -> Self {
        Planner { store, git, dispatch }
    }

    #[tracing::instrument(skip(self, service, pending, input), fields(service_id = %service.id))]
    pub async fn prepare_new_deployment(
        &self,
        service: &mut Service,
        pending: Vec<DeploymentChange>,
        input: PrepareNewDeployment,
        git_auth_token: Option<&str>,
    ) -> Result<Deployment, PlannerError> {
        let deployment_id = DeploymentId::new();
        let hash = generate_hash();
        let workflow_id = format!("Deploy-{}-{hash}", service.slug);

        let mut projected = service.clone();
        let applied = apply_pending_changes(&mut projected, pending, deployment_id)?;

        let mut tx = self.store.begin().await?;
        repo::services::upsert(tx.as_mut(), &projected).await?;
        for change in &applied {
            repo::deployment_changes::mark_applied(tx.as_mut(), change, deployment_id).await?;
        }

        let mut distinct_ports: Vec<u16> = projected.urls.iter().map(|u| u.associated_port).collect();
        distinct_ports.sort_unstable();
        distinct_ports.dedup();
        for port in &distinct_ports {
            let domain = projected
                .urls
                .iter()
                .find(|u| u.associated_port == *port)
                .map(|u| u.domain.clone())
                .unwrap_or_default();
            let deployment_url = DeploymentUrl {
                id: DeploymentUrlId::new(),
                deployment_id,
                port: *port,
                domain,
            };
            repo::deployment_urls::insert(tx.as_mut(), &deployment_url).await?;
        }

        let latest_production = repo::deployments::latest_production(self.store.pool(), service.id).await?;
        let slot = latest_production
            .as_ref()
            .map(|d| d.slot.opposite())
            .unwrap_or(Slot::Blue);

        if let ServiceSource::Git { commit_sha, repository_url, branch_name, .. } = &mut projected.source {
            if commit_sha.as_str() == "HEAD" {
                if let Ok(resolved) = self
                    .git
                    .resolve_branch_head(repository_url, branch_name, git_auth_token)
                    .await
                {
                    *commit_sha = resolved;
                }
            }
        }

        let service_snapshot = serde_json::to_value(&projected)
            .map_err(|err| zaneops_persistence::PersistenceError::Corrupt(err.to_string()))?;

        let resolved_commit_sha = match &projected.source {
            ServiceSource::Git { commit_sha, .. } => Some(commit_sha.clone()),
            ServiceSource::Image { .. } => None,
        };

        let deployment = Deployment {
            id: deployment_id,
            service_id: service.id,
            hash,
            workflow_id,
            slot,
            status: DeploymentStatus::Queued,
            service_snapshot,
            commit_sha: resolved_commit_sha,
            commit_message: input.commit_message,
            commit_author_name: input.commit_author_name,
            trigger_method: input.trigger_method,
            is_redeploy_of: input.is_redeploy_of,
            is_current_production: false,
            queued_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
            status_reason: None,
            ignore_build_cache: input.ignore_build_cache,
            last_completed_step: None,
        };
        repo::deployments::insert(tx.as_mut(), &deployment).await?;

        let dispatch = self.dispatch.clone();
        tx.on_commit(move || {
            let _ = dispatch.send(deployment_id);
        });
        tx.commit().await?;

        *service = projected;
        Ok(deployment)
    }
}

fn generate_hash() -> String {
    let lower = ulid::Ulid::new().to_string().to_lowercase();
    lower[..10].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use zaneops_common::ids::{DeploymentChangeId, EnvironmentId, ProjectId, ServiceId};
    use zaneops_common::models::{ChangeField, ChangeType, ResourceLimits};
    use zaneops_persistence::Store;

    struct NeverCalledResolver;

    #[async_trait]
    impl GitRefResolver for NeverCalledResolver {
        async fn resolve_branch_head(
            &self,
            _repository_url: &str,
            _branch_name: &str,
            _auth_token: Option<&str>,
        ) -> Result<String, crate::git::GitResolveError> {
            panic!("image-kind service should never resolve a git ref");
        }
    }

    fn base_service() -> Service {
        Service {
            id: ServiceId::new(),
            project_id: ProjectId::new(),
            environment_id: EnvironmentId::new(),
            slug: "cache".into(),
            unprefixed_id: "x".into(),
            source: ServiceSource::Image {
                image: "redis:alpine".into(),
                credentials: None,
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
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn first_deployment_of_a_service_lands_on_blue() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let (tx_dispatch, mut rx_dispatch) = tokio::sync::mpsc::unbounded_channel();
        let planner = Planner::new(store, Arc::new(NeverCalledResolver), tx_dispatch);

        let mut service = base_service();
        let deployment = planner
            .prepare_new_deployment(
                &mut service,
                vec![],
                PrepareNewDeployment {
                    commit_message: None,
                    commit_author_name: None,
                    trigger_method: TriggerMethod::Manual,
                    is_redeploy_of: None,
                    ignore_build_cache: false,
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(deployment.slot, Slot::Blue);
        assert_eq!(deployment.status, DeploymentStatus::Queued);
        assert_eq!(rx_dispatch.recv().await, Some(deployment.id));
    }

    #[tokio::test]
    async fn pending_changes_are_applied_and_persisted_before_queuing() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let (tx_dispatch, _rx_dispatch) = tokio::sync::mpsc::unbounded_channel();
        let planner = Planner::new(store, Arc::new(NeverCalledResolver), tx_dispatch);

        let mut service = base_service();
        let change = DeploymentChange {
            id: DeploymentChangeId::new(),
            service_id: service.id,
            field: ChangeField::Command,
            change_type: ChangeType::Update,
            old_value: serde_json::Value::Null,
            new_value: serde_json::json!("redis-server --appendonly yes"),
            item_id: None,
            applied: false,
            deployment_id: None,
            created_at: chrono::Utc::now(),
        };

        planner
            .prepare_new_deployment(
                &mut service,
                vec![change],
                PrepareNewDeployment {
                    commit_message: None,
                    commit_author_name: None,
                    trigger_method: TriggerMethod::Api,
                    is_redeploy_of: None,
                    ignore_build_cache: false,
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(service.command.as_deref(), Some("redis-server --appendonly yes"));
    }
}
