pub mod change;
pub mod deployment;
pub mod environment;
pub mod git_app;
pub mod preview_template;
pub mod project;
pub mod service;

pub use change::{ChangeField, ChangeType, DeploymentChange};
pub use deployment::{Deployment, DeploymentStatus, DeploymentUrl, Slot, TriggerMethod};
pub use environment::{Environment, PreviewDeployState, PreviewMetadata, SourceTrigger};
pub use git_app::{GitApp, GitAppCredential, GitAppKind, GitAppSnapshot};
pub use preview_template::{PreviewTemplate, SidecarBlueprint};
pub use project::Project;
pub use service::{
    BuilderConfig, BuilderKind, Config, EnvVariable, Healthcheck, HealthcheckKind, Port,
    RegistryCredentials, ResourceLimits, Service, ServiceKind, ServiceSource, Url, Volume,
    VolumeMode,
};
