use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::ids::{EnvironmentId, GitAppId, PreviewTemplateId, ProjectId, ServiceId};

/// A namespace within a project. `production` is implicit and
/// non-deletable; preview environments carry [`PreviewMetadata`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Environment {
    pub id: EnvironmentId,
    pub project_id: ProjectId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub preview_metadata: Option<PreviewMetadata>,
}

pub const PRODUCTION_ENVIRONMENT_NAME: &str = "production";

impl Environment {
    pub fn is_production(&self) -> bool {
        self.name == PRODUCTION_ENVIRONMENT_NAME
    }

    pub fn is_preview(&self) -> bool {
        self.preview_metadata.is_some()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceTrigger {
    Push,
    PullRequest,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PreviewDeployState {
    Pending,
    Approved,
    Declined,
}

/// Associated with a preview [`Environment`]; the source of truth for
/// whether a fork PR has been approved to deploy and for the cleanup
/// performed when the PR/MR is closed or merged.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreviewMetadata {
    pub environment_id: EnvironmentId,
    pub source_trigger: SourceTrigger,
    pub pr_number: Option<u64>,
    pub pr_title: Option<String>,
    pub branch_name: String,
    pub head_repository_url: String,
    pub base_repository_url: String,
    pub commit_sha: String,
    pub deploy_state: PreviewDeployState,
    pub template_id: PreviewTemplateId,
    pub git_app_id: Option<GitAppId>,
    /// The service whose Git source seeded this preview environment.
    pub source_service_id: ServiceId,
}

impl PreviewMetadata {
    /// A fork PR originates from a repository other than the base repo and
    /// must wait for explicit human approval before anything deploys.
    pub fn is_fork(&self) -> bool {
        self.head_repository_url != self.base_repository_url
    }
}
