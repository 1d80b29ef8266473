//! The workflow driver: walks a queued [`Deployment`] through the step
//! sequence from spec.md §4.4, persisting a step marker after each step and
//! polling for cancellation at every suspension point. Mirrors the shape of
//! `deployer::project::service`'s state machine, flattened into one
//! sequential function since every step here is a single bounded call to
//! the Runtime Adapter or Proxy Control-Plane rather than its own
//! multi-poll state.

use std::time::Duration;

use tracing::{info, instrument, warn};

use zaneops_common::ids::DeploymentId;
use zaneops_common::models::{Deployment, DeploymentStatus, Project, Service, ServiceSource};
use zaneops_persistence::repo;
use zaneops_runtime_adapter::healthcheck::{wait_until_healthy, wait_until_running, HealthcheckOutcome};
use zaneops_runtime_adapter::spec::{service_spec_for_deployment, ServiceSpecInput};

use crate::builder::{build_image, clone_repository};
use crate::cancel::CancelHandle;
use crate::ctx::ExecutorCtx;
use crate::error::ExecutorError;
use crate::step::StepMarker;

pub struct Executor {
    ctx: ExecutorCtx,
}

impl Executor {
    pub fn new(ctx: ExecutorCtx) -> Self {
        Self { ctx }
    }

    /// Runs `deployment_id` to a terminal [`DeploymentStatus`]. Only truly
    /// unexpected failures (a persistence error while recording the
    /// outcome, a corrupt snapshot) surface as `Err`; every deployment-level
    /// failure the spec names (FAILED, UNHEALTHY, CANCELLED) is a normal
    /// `Ok` return.
    #[instrument(skip(self), fields(deployment_id = %deployment_id))]
    pub async fn run(&self, deployment_id: DeploymentId) -> Result<DeploymentStatus, ExecutorError> {
        let mut deployment = repo::deployments::fetch(self.ctx.store.pool(), deployment_id).await?;
        let service: Service = serde_json::from_value(deployment.service_snapshot.clone())
            .map_err(|err| ExecutorError::Builder(format!("corrupt service snapshot: {err}")))?;
        let project = repo::projects::fetch(self.ctx.store.pool(), service.project_id).await?;

        let cancel = self.ctx.cancel_registry.subscribe(&deployment.workflow_id).await;
        let outcome = self.drive(&mut deployment, &service, &project, &cancel).await;
        self.ctx.cancel_registry.forget(&deployment.workflow_id).await;
        outcome
    }

    async fn drive(
        &self,
        deployment: &mut Deployment,
        service: &Service,
        project: &Project,
        cancel: &CancelHandle,
    ) -> Result<DeploymentStatus, ExecutorError> {
        let is_git = matches!(service.source, ServiceSource::Git { .. });
        let network_name = project.network_name();
        let runtime_service_name = deployment.runtime_service_name(&project.slug, &service.slug, is_git);

        deployment.status = DeploymentStatus::Preparing;
        deployment.started_at = Some(chrono::Utc::now());
        self.save(deployment).await?;

        self.ctx.runtime.create_network(&network_name).await?;
        self.mark_step(deployment, StepMarker::Initialized).await?;

        let image_tag = match self.acquire_source(deployment, service, cancel).await? {
            Some(tag) => tag,
            None => return Ok(deployment.status),
        };

        if cancel.is_cancelled() {
            return self.cancel_before_swarm_service(deployment, "before volumes/configs").await;
        }

        if let Err(err) = self.provision_volumes_and_configs(deployment, service, &project.slug).await {
            return self.fail_before_swarm_service(deployment, err).await;
        }

        if cancel.is_cancelled() {
            return self.cancel_before_swarm_service(deployment, "before previous deployment teardown").await;
        }

        let previous_production = repo::deployments::latest_production(self.ctx.store.pool(), service.id)
            .await?
            .filter(|d| d.id != deployment.id);
        let previous_runtime_name = previous_production
            .as_ref()
            .map(|d| d.runtime_service_name(&project.slug, &service.slug, is_git));

        if let Some(name) = &previous_runtime_name {
            if let Err(err) = self.ctx.runtime.scale_service(name, 0).await {
                return self.fail_before_swarm_service(deployment, err.into()).await;
            }
        }
        self.mark_step(deployment, StepMarker::PreviousDeploymentScaledDown).await?;

        if cancel.is_cancelled() {
            return self
                .rollback_after_scale_down(
                    deployment,
                    previous_runtime_name.as_deref(),
                    DeploymentStatus::Cancelled,
                    "cancelled before swarm service creation",
                )
                .await;
        }

        let spec_input = ServiceSpecInput {
            project_slug: &project.slug,
            runtime_service_name: &runtime_service_name,
            image: &image_tag,
            network_name: &network_name,
            replicas: 1,
        };
        let spec = service_spec_for_deployment(service, deployment, &spec_input);
        if let Err(err) = self.ctx.runtime.create_service(spec).await {
            return self
                .rollback_after_scale_down(
                    deployment,
                    previous_runtime_name.as_deref(),
                    DeploymentStatus::Failed,
                    &err.to_string(),
                )
                .await;
        }
        self.mark_step(deployment, StepMarker::SwarmServiceCreated).await?;
        deployment.status = DeploymentStatus::Starting;
        self.save(deployment).await?;

        let healthy = self.wait_for_health(&runtime_service_name, service).await?;
        if healthy == HealthcheckOutcome::Unhealthy {
            deployment.status = DeploymentStatus::Unhealthy;
            return self
                .rollback_new_service(deployment, &runtime_service_name, previous_runtime_name.as_deref(), "healthcheck deadline exceeded")
                .await;
        }
        deployment.status = DeploymentStatus::Healthy;
        self.save(deployment).await?;

        if cancel.is_cancelled() {
            deployment.status = DeploymentStatus::Cancelled;
            return self
                .rollback_new_service(deployment, &runtime_service_name, previous_runtime_name.as_deref(), "cancelled after becoming healthy")
                .await;
        }

        let deployment_urls = repo::deployment_urls::for_deployment(self.ctx.store.pool(), deployment.id).await?;
        for url in &deployment_urls {
            if let Err(err) = self.ctx.proxy.expose_deployment(deployment, url).await {
                return self
                    .rollback_new_service(deployment, &runtime_service_name, previous_runtime_name.as_deref(), &err.to_string())
                    .await;
            }
        }
        self.mark_step(deployment, StepMarker::DeploymentExposedToHttp).await?;

        for url in &service.urls {
            if let Err(err) = self.ctx.proxy.expose_service(url, deployment.slot).await {
                return self
                    .rollback_new_service(deployment, &runtime_service_name, previous_runtime_name.as_deref(), &err.to_string())
                    .await;
            }
            if let Err(err) = self.ctx.proxy.promote(url, deployment.slot).await {
                return self
                    .rollback_new_service(deployment, &runtime_service_name, previous_runtime_name.as_deref(), &err.to_string())
                    .await;
            }
        }
        self.mark_step(deployment, StepMarker::ServiceExposedToHttp).await?;

        self.promote_and_teardown_previous(deployment, previous_production, &project.slug, &service.slug, is_git)
            .await?;

        self.mark_step(deployment, StepMarker::Finished).await?;
        Ok(deployment.status)
    }

    /// Runs the source-acquisition half: a no-op returning the configured
    /// image for image-kind services, or the CLONING_REPOSITORY →
    /// BUILDING_IMAGE → IMAGE_BUILT prefix for git-kind ones. Returns
    /// `Ok(None)` once `deployment.status` has already been set to a
    /// terminal value (cancelled or failed before any runtime resource
    /// exists).
    async fn acquire_source(
        &self,
        deployment: &mut Deployment,
        service: &Service,
        cancel: &CancelHandle,
    ) -> Result<Option<String>, ExecutorError> {
        match &service.source {
            ServiceSource::Image { image, .. } => Ok(Some(image.clone())),
            ServiceSource::Git {
                repository_url,
                branch_name,
                commit_sha,
                git_app_id,
                builder,
            } => {
                deployment.status = DeploymentStatus::Building;
                self.save(deployment).await?;

                if cancel.is_cancelled() {
                    deployment.status = DeploymentStatus::Cancelled;
                    deployment.status_reason = Some("cancelled before cloning the repository".into());
                    self.finish(deployment).await?;
                    return Ok(None);
                }

                let checkout_dir = self.ctx.workspace_root.join(&deployment.hash);
                if let Err(err) = tokio::fs::create_dir_all(&checkout_dir).await {
                    return self.fail_and_return_none(deployment, err.into()).await;
                }

                let clone_auth_url = match git_app_id {
                    Some(id) => {
                        let app = repo::git_apps::fetch(self.ctx.store.pool(), *id).await?;
                        match self
                            .ctx
                            .git_broker
                            .authenticated_repository_url(&id.to_string(), app.kind, &app.credential, repository_url)
                            .await
                        {
                            Ok(url) => Some(url),
                            Err(err) => {
                                return self
                                    .fail_and_return_none(deployment, ExecutorError::Builder(err.to_string()))
                                    .await
                            }
                        }
                    }
                    None => None,
                };
                let clone_url = clone_auth_url.as_deref().unwrap_or(repository_url);

                self.mark_step(deployment, StepMarker::CloningRepository).await?;
                if let Err(err) = clone_repository(clone_url, branch_name, commit_sha, None, &checkout_dir).await {
                    return self.fail_and_return_none(deployment, err).await;
                }
                self.mark_step(deployment, StepMarker::RepositoryCloned).await?;

                if cancel.is_cancelled() {
                    deployment.status = DeploymentStatus::Cancelled;
                    deployment.status_reason = Some("cancelled after cloning the repository".into());
                    self.finish(deployment).await?;
                    return Ok(None);
                }

                self.mark_step(deployment, StepMarker::BuildingImage).await?;
                let image_tag = format!("zaneops/{}:{}", service.slug, deployment.hash);
                if let Err(err) = build_image(
                    self.ctx.runtime.docker(),
                    &checkout_dir,
                    builder,
                    &image_tag,
                    deployment.ignore_build_cache,
                )
                .await
                {
                    return self.fail_and_return_none(deployment, err).await;
                }
                self.mark_step(deployment, StepMarker::ImageBuilt).await?;

                Ok(Some(image_tag))
            }
        }
    }

    async fn provision_volumes_and_configs(
        &self,
        deployment: &mut Deployment,
        service: &Service,
        project_slug: &str,
    ) -> Result<(), ExecutorError> {
        for volume in &service.volumes {
            if volume.host_path.is_none() {
                self.ctx.runtime.create_volume(&volume.resource_name(project_slug)).await?;
            }
        }
        self.mark_step(deployment, StepMarker::VolumesCreated).await?;

        for config in &service.configs {
            self.ctx
                .runtime
                .create_config(&config.resource_name(project_slug), &config.contents)
                .await?;
        }
        self.mark_step(deployment, StepMarker::ConfigsCreated).await?;
        Ok(())
    }

    async fn wait_for_health(
        &self,
        runtime_service_name: &str,
        service: &Service,
    ) -> Result<HealthcheckOutcome, ExecutorError> {
        let outcome = match &service.healthcheck {
            Some(healthcheck) => {
                let probe_target = format!("{}:{}", runtime_service_name, healthcheck.associated_port);
                wait_until_healthy(&self.ctx.runtime, runtime_service_name, healthcheck, self.ctx.probe.as_ref(), &probe_target).await?
            }
            None => wait_until_running(&self.ctx.runtime, runtime_service_name, Duration::from_secs(30)).await?,
        };
        Ok(outcome)
    }

    async fn promote_and_teardown_previous(
        &self,
        deployment: &mut Deployment,
        previous_production: Option<Deployment>,
        project_slug: &str,
        service_slug: &str,
        is_git: bool,
    ) -> Result<(), ExecutorError> {
        deployment.is_current_production = true;
        self.save(deployment).await?;

        let Some(mut previous) = previous_production else {
            return Ok(());
        };

        previous.is_current_production = false;
        self.save(&previous).await?;

        tokio::time::sleep(self.ctx.config.teardown_grace_period).await;

        let previous_runtime_name = previous.runtime_service_name(project_slug, service_slug, is_git);
        self.ctx.runtime.remove_service(&previous_runtime_name).await?;

        let previous_urls = repo::deployment_urls::for_deployment(self.ctx.store.pool(), previous.id).await?;
        for url in &previous_urls {
            self.ctx.proxy.remove_deployment_route(&previous, url).await?;
        }

        Ok(())
    }

    /// Rolls back a deployment that failed or was cancelled strictly before
    /// PREVIOUS_DEPLOYMENT_SCALED_DOWN: no swarm service or scale change
    /// exists yet for this deployment, so there is nothing to tear down.
    /// Volumes and configs already created are left in place -- both are
    /// keyed by content/name, so a retry (redeploy) reuses them rather than
    /// orphaning and recreating (see DESIGN.md).
    async fn fail_before_swarm_service(
        &self,
        deployment: &mut Deployment,
        err: ExecutorError,
    ) -> Result<DeploymentStatus, ExecutorError> {
        warn!(%err, "deployment failed before swarm service creation");
        deployment.status = DeploymentStatus::Failed;
        deployment.status_reason = Some(err.to_string());
        self.finish(deployment).await?;
        Ok(deployment.status)
    }

    async fn fail_and_return_none(
        &self,
        deployment: &mut Deployment,
        err: ExecutorError,
    ) -> Result<Option<String>, ExecutorError> {
        self.fail_before_swarm_service(deployment, err).await?;
        Ok(None)
    }

    async fn cancel_before_swarm_service(
        &self,
        deployment: &mut Deployment,
        at: &str,
    ) -> Result<DeploymentStatus, ExecutorError> {
        info!(at, "deployment cancelled before swarm service creation");
        deployment.status = DeploymentStatus::Cancelled;
        deployment.status_reason = Some(format!("cancelled {at}"));
        self.finish(deployment).await?;
        Ok(deployment.status)
    }

    /// Rolls back a deployment that failed or was cancelled after
    /// PREVIOUS_DEPLOYMENT_SCALED_DOWN but before (or instead of) a swarm
    /// service existing for the candidate: restores the previous
    /// deployment's replica count.
    async fn rollback_after_scale_down(
        &self,
        deployment: &mut Deployment,
        previous_runtime_name: Option<&str>,
        status: DeploymentStatus,
        reason: &str,
    ) -> Result<DeploymentStatus, ExecutorError> {
        if let Some(name) = previous_runtime_name {
            self.ctx.runtime.scale_service(name, 1).await?;
        }
        deployment.status = status;
        deployment.status_reason = Some(reason.to_string());
        self.finish(deployment).await?;
        Ok(deployment.status)
    }

    /// Rolls back a deployment that failed, was cancelled, or went
    /// UNHEALTHY at or after SWARM_SERVICE_CREATED: tears down the new
    /// swarm service and restores the previous one's scale, then reverts
    /// proxy state (a no-op if exposure never ran, since both proxy calls
    /// happen after the healthcheck gate).
    async fn rollback_new_service(
        &self,
        deployment: &mut Deployment,
        runtime_service_name: &str,
        previous_runtime_name: Option<&str>,
        reason: &str,
    ) -> Result<DeploymentStatus, ExecutorError> {
        self.ctx.runtime.remove_service(runtime_service_name).await?;
        if let Some(name) = previous_runtime_name {
            self.ctx.runtime.scale_service(name, 1).await?;
        }

        let deployment_urls = repo::deployment_urls::for_deployment(self.ctx.store.pool(), deployment.id).await?;
        for url in &deployment_urls {
            self.ctx.proxy.remove_deployment_route(deployment, url).await?;
        }

        if deployment.status != DeploymentStatus::Unhealthy {
            deployment.status = if deployment.status == DeploymentStatus::Cancelled {
                DeploymentStatus::Cancelled
            } else {
                DeploymentStatus::Failed
            };
        }
        deployment.status_reason = Some(reason.to_string());
        self.finish(deployment).await?;
        Ok(deployment.status)
    }

    async fn mark_step(&self, deployment: &mut Deployment, marker: StepMarker) -> Result<(), ExecutorError> {
        deployment.last_completed_step = Some(marker.to_string());
        self.save(deployment).await
    }

    async fn save(&self, deployment: &Deployment) -> Result<(), ExecutorError> {
        let mut tx = self.ctx.store.begin().await?;
        repo::deployments::save(tx.as_mut(), deployment).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn finish(&self, deployment: &mut Deployment) -> Result<(), ExecutorError> {
        deployment.finished_at = Some(chrono::Utc::now());
        self.save(deployment).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_markers_serialize_to_the_strings_spec_md_names() {
        assert_eq!(StepMarker::SwarmServiceCreated.to_string(), "SWARM_SERVICE_CREATED");
        assert_eq!(StepMarker::CloningRepository.to_string(), "CLONING_REPOSITORY");
        assert_eq!(StepMarker::Finished.to_string(), "FINISHED");
    }
}
