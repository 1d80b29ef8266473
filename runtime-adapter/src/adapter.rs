//! `RuntimeAdapter` is the only way the rest of the workspace talks to the
//! container runtime. Every method is idempotent: retrying a create
//! against an existing resource of the same name is a no-op (spec.md §9,
//! "Idempotent naming"), and deleting a resource that is already gone is
//! treated as success (spec.md §4.5's "404 on delete is success", applied
//! here to the runtime as well as the proxy).

use bollard::config::CreateConfigOptions;
use bollard::models::{ConfigSpec, ServiceSpec, Task};
use bollard::network::CreateNetworkOptions;
use bollard::service::{
    CreateServiceOptions, ListTasksOptions, UpdateServiceOptions,
};
use bollard::volume::CreateVolumeOptions;
use bollard::Docker;
use std::collections::HashMap;
use tracing::{debug, instrument};

use zaneops_backends::retry::{retry_with_backoff, RetryConfig};

use crate::error::{RuntimeAdapterError, RuntimeAdapterResult};

#[derive(Clone)]
pub struct RuntimeAdapter {
    docker: Docker,
    retry: RetryConfig,
}

impl RuntimeAdapter {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Escape hatch for callers that need the raw `bollard` handle for an
    /// operation this adapter doesn't wrap, e.g. `zaneops-executor`'s image
    /// build step.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// `NetworkCreate(name, driver=overlay, attachable)`. A 409 means the
    /// network already carries this name, which given the naming scheme in
    /// spec.md §4.4 can only mean a previous attempt already succeeded.
    #[instrument(skip(self))]
    pub async fn create_network(&self, name: &str) -> RuntimeAdapterResult<()> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: "overlay".to_string(),
            attachable: true,
            ..Default::default()
        };

        match self.docker.create_network(options).await {
            Ok(_) => Ok(()),
            Err(err) if RuntimeAdapterError::from(err).is_already_exists() => {
                debug!(name, "network already exists, treating as success");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn create_volume(&self, name: &str) -> RuntimeAdapterResult<()> {
        let options = CreateVolumeOptions {
            name: name.to_string(),
            driver: "local".to_string(),
            ..Default::default()
        };

        match self.docker.create_volume(options).await {
            Ok(_) => Ok(()),
            Err(err) if RuntimeAdapterError::from(err).is_already_exists() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Small text blob mounted as a file; configs are immutable in the
    /// runtime, so a changed [`zaneops_common::models::Config`] must be
    /// created under a fresh name rather than updated in place -- the
    /// caller is responsible for deriving a name that changes with content.
    #[instrument(skip(self, contents))]
    pub async fn create_config(&self, name: &str, contents: &str) -> RuntimeAdapterResult<()> {
        let spec = ConfigSpec {
            name: Some(name.to_string()),
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                contents.as_bytes(),
            )),
            ..Default::default()
        };

        match self
            .docker
            .create_config(CreateConfigOptions::default(), spec)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if RuntimeAdapterError::from(err).is_already_exists() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self, spec))]
    pub async fn create_service(&self, spec: ServiceSpec) -> RuntimeAdapterResult<String> {
        match retry_with_backoff(self.retry, || {
            self.docker
                .create_service(spec.clone(), None::<CreateServiceOptions>)
        })
        .await
        {
            Ok(response) => Ok(response.id.unwrap_or_default()),
            Err(err) if RuntimeAdapterError::from(err).is_already_exists() => {
                let name = spec.name.clone().unwrap_or_default();
                debug!(name, "service already exists, reusing it");
                Ok(name)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// `ServiceUpdate(name, mode.Replicated.Replicas=n)`; used both to scale
    /// a superseded deployment down to zero and, on rollback, to restore it.
    #[instrument(skip(self))]
    pub async fn scale_service(&self, name: &str, replicas: u64) -> RuntimeAdapterResult<()> {
        let inspected = self.docker.inspect_service(name, None).await?;
        let mut spec = inspected.spec.unwrap_or_default();
        let mode = spec.mode.get_or_insert_with(Default::default);
        let replicated = mode.replicated.get_or_insert_with(Default::default);
        replicated.replicas = Some(replicas as i64);

        let version = inspected
            .version
            .and_then(|v| v.index)
            .unwrap_or_default();

        retry_with_backoff(self.retry, || {
            self.docker.update_service(
                name,
                spec.clone(),
                UpdateServiceOptions {
                    version,
                    ..Default::default()
                },
                None,
            )
        })
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_service(&self, name: &str) -> RuntimeAdapterResult<()> {
        match self.docker.delete_service(name).await {
            Ok(()) => Ok(()),
            Err(err) if RuntimeAdapterError::from(err).is_not_found() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Used by environment archival (spec.md §4.6 "closed/merged") to
    /// cascade-remove a service's runtime-managed volumes. A volume still
    /// in use by a swarm task returns 409 rather than 404 -- callers must
    /// remove the owning service first.
    #[instrument(skip(self))]
    pub async fn remove_volume(&self, name: &str) -> RuntimeAdapterResult<()> {
        match self.docker.remove_volume(name, None).await {
            Ok(()) => Ok(()),
            Err(err) if RuntimeAdapterError::from(err).is_not_found() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn remove_config(&self, name: &str) -> RuntimeAdapterResult<()> {
        match self.docker.remove_config(name).await {
            Ok(()) => Ok(()),
            Err(err) if RuntimeAdapterError::from(err).is_not_found() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes the project overlay network. Called on project archival
    /// only (spec.md §5, "Shared-resource policy") -- never by per-environment
    /// cleanup, since the network is shared by every service in the project.
    #[instrument(skip(self))]
    pub async fn remove_network(&self, name: &str) -> RuntimeAdapterResult<()> {
        match self.docker.remove_network(name).await {
            Ok(()) => Ok(()),
            Err(err) if RuntimeAdapterError::from(err).is_not_found() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn list_tasks(&self, service_name: &str) -> RuntimeAdapterResult<Vec<Task>> {
        let mut filters = HashMap::new();
        filters.insert("service".to_string(), vec![service_name.to_string()]);

        let tasks = self
            .docker
            .list_tasks(Some(ListTasksOptions { filters }))
            .await?;
        Ok(tasks)
    }

    /// Shell-command probe variant of the healthcheck gate: runs
    /// `command` inside the first running task's container via `docker
    /// exec`. The HTTP-probe variant lives at the proxy/DeploymentURL layer
    /// and is driven by `zaneops-executor` directly over HTTP, not through
    /// this adapter.
    #[instrument(skip(self, command))]
    pub async fn exec_healthcheck(
        &self,
        container_id: &str,
        command: &str,
    ) -> RuntimeAdapterResult<bool> {
        use bollard::exec::{CreateExecOptions, StartExecResults};

        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(vec!["/bin/sh".to_string(), "-c".to_string(), command.to_string()]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            use futures::StreamExt;
            while output.next().await.is_some() {}
        }

        let inspected = self.docker.inspect_exec(&exec.id).await?;
        Ok(inspected.exit_code == Some(0))
    }
}
