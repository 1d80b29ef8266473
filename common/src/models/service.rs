use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::ids::{ConfigId, DeploymentId, EnvironmentId, GitAppId, ProjectId, ServiceId, UrlId, VolumeId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceKind {
    Image,
    Git,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryCredentials {
    pub registry_url: String,
    pub username: String,
    pub password: String,
}

/// The currently applied, authoritative configuration of a service: either
/// a container image pulled from a registry, or a Git repository built by
/// one of the [`BuilderKind`] variants.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceSource {
    Image {
        image: String,
        credentials: Option<RegistryCredentials>,
    },
    Git {
        repository_url: String,
        branch_name: String,
        /// `"HEAD"` means "resolve at plan time"; a frozen snapshot always
        /// carries a resolved 40-character SHA once the Planner has run.
        commit_sha: String,
        git_app_id: Option<GitAppId>,
        builder: BuilderConfig,
    },
}

impl ServiceSource {
    pub fn kind(&self) -> ServiceKind {
        match self {
            ServiceSource::Image { .. } => ServiceKind::Image,
            ServiceSource::Git { .. } => ServiceKind::Git,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BuilderKind {
    Dockerfile,
    StaticDir,
    Nixpacks,
    Railpack,
}

/// Builder options, keyed by [`BuilderKind`]. `STATIC_DIR` and static-mode
/// `NIXPACKS`/`RAILPACK` precompute a Caddyfile fragment so the resulting
/// image is a thin static-file server and the executor never re-derives
/// routing rules from scratch.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuilderConfig {
    Dockerfile {
        dockerfile_path: String,
        build_context_dir: String,
        build_stage_target: Option<String>,
    },
    StaticDir {
        publish_directory: String,
        generated_caddyfile: String,
        not_found_page: Option<String>,
        index_page: String,
    },
    Nixpacks {
        build_directory: String,
        custom_install_command: Option<String>,
        custom_build_command: Option<String>,
        custom_start_command: Option<String>,
        is_static: bool,
        generated_caddyfile: Option<String>,
    },
    Railpack {
        build_directory: String,
        custom_install_command: Option<String>,
        custom_build_command: Option<String>,
        custom_start_command: Option<String>,
        is_static: bool,
        generated_caddyfile: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HealthcheckKind {
    Path,
    Command,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Healthcheck {
    pub kind: HealthcheckKind,
    /// HTTP path, used when `kind == Path`.
    pub path: Option<String>,
    /// Shell command executed inside a task, used when `kind == Command`.
    pub command: Option<String>,
    pub associated_port: u16,
    #[serde(default = "Healthcheck::default_timeout_seconds")]
    pub timeout_seconds: u32,
    #[serde(default = "Healthcheck::default_interval_seconds")]
    pub interval_seconds: u32,
}

impl Healthcheck {
    pub const fn default_timeout_seconds() -> u32 {
        30
    }

    pub const fn default_interval_seconds() -> u32 {
        30
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_millicores: Option<u32>,
    pub memory_bytes: Option<u64>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VolumeMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Volume {
    pub id: VolumeId,
    pub service_id: ServiceId,
    pub slug: String,
    pub container_path: String,
    pub mode: VolumeMode,
    /// A bind-mounted volume (`Some`) cannot be shared read-only with
    /// another service; only runtime-managed named volumes can be.
    pub host_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Volume {
    /// `vol-<project.slug>-<volume.slug>-<volume.ts>`
    pub fn resource_name(&self, project_slug: &str) -> String {
        format!(
            "vol-{project_slug}-{}-{}",
            self.slug,
            self.created_at.timestamp_micros()
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub id: ConfigId,
    pub service_id: ServiceId,
    pub name: String,
    pub contents: String,
    pub mount_path: String,
}

impl Config {
    /// Configs are immutable in the runtime, so a name that changes with
    /// `contents` is what makes a content edit create a fresh config object
    /// instead of silently failing to update one in place.
    pub fn resource_name(&self, project_slug: &str) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.contents.hash(&mut hasher);
        format!("cfg-{project_slug}-{}-{:x}", self.name, hasher.finish())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Port {
    pub host_port: Option<u16>,
    pub forwarded_port: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Url {
    pub id: UrlId,
    pub service_id: ServiceId,
    pub domain: String,
    pub base_path: String,
    pub strip_prefix: bool,
    pub associated_port: u16,
}

impl Url {
    /// Uniqueness key enforced project-wide: no two urls, on any service,
    /// may share `(domain, base_path)`.
    pub fn uniqueness_key(&self) -> (String, String) {
        (self.domain.clone(), self.base_path.clone())
    }

    /// `service:<service.id>:<url.id>`, the proxy route id owned by the
    /// service across all of its deployments.
    pub fn route_id(&self) -> String {
        format!("service:{}:{}", self.service_id, self.id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvVariable {
    pub key: String,
    pub value: String,
}

/// The configured workload. Attributes mirror §3 of the design: unique
/// slug within (project, environment); current applied [`ServiceSource`];
/// ordered collections of volumes/configs/ports/urls/env vars; an optional
/// healthcheck; a stable `network_alias`; an opaque `deploy_token`; and a
/// glob filter over watched paths for auto-deploy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub project_id: ProjectId,
    pub environment_id: EnvironmentId,
    pub slug: String,
    /// Opaque stable identifier baked into the network alias, independent
    /// of the service's user-facing slug so renames don't churn DNS.
    pub unprefixed_id: String,
    pub source: ServiceSource,
    pub command: Option<String>,
    pub healthcheck: Option<Healthcheck>,
    pub resource_limits: ResourceLimits,
    pub volumes: Vec<Volume>,
    pub configs: Vec<Config>,
    pub ports: Vec<Port>,
    pub urls: Vec<Url>,
    pub env_variables: Vec<EnvVariable>,
    pub deploy_token: String,
    pub watch_paths: Option<Vec<String>>,
    pub auto_deploy: bool,
    pub current_production_deployment_id: Option<DeploymentId>,
    pub created_at: DateTime<Utc>,
}

impl Service {
    /// `zn-<service.slug>-<service.unprefixed_id>`, stable across every
    /// deployment of this service.
    pub fn network_alias(&self) -> String {
        format!("zn-{}-{}", self.slug, self.unprefixed_id)
    }

    pub fn has_source(&self) -> bool {
        match &self.source {
            ServiceSource::Image { image, .. } => !image.is_empty(),
            ServiceSource::Git {
                repository_url, ..
            } => !repository_url.is_empty(),
        }
    }
}
