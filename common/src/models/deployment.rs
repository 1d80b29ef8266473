use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::ids::{DeploymentId, DeploymentUrlId, ServiceId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Slot {
    Blue,
    Green,
}

impl Slot {
    pub fn opposite(self) -> Self {
        match self {
            Slot::Blue => Slot::Green,
            Slot::Green => Slot::Blue,
        }
    }

    /// `<slot>.zaneops.internal`, the per-deployment alias the proxy dials.
    pub fn internal_alias(self) -> &'static str {
        match self {
            Slot::Blue => "blue.zaneops.internal",
            Slot::Green => "green.zaneops.internal",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Queued,
    Preparing,
    Building,
    Starting,
    Restarting,
    Healthy,
    Unhealthy,
    Failed,
    Cancelled,
    Removed,
    Sleeping,
}

impl DeploymentStatus {
    /// Statuses a [`DeploymentStatus`] can hold while still eligible for
    /// cancellation (flagged or signalled).
    pub const CANCELLABLE: [DeploymentStatus; 5] = [
        DeploymentStatus::Queued,
        DeploymentStatus::Preparing,
        DeploymentStatus::Building,
        DeploymentStatus::Starting,
        DeploymentStatus::Restarting,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Healthy
                | DeploymentStatus::Unhealthy
                | DeploymentStatus::Failed
                | DeploymentStatus::Cancelled
                | DeploymentStatus::Removed
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerMethod {
    Manual,
    Api,
    Auto,
}

/// An attempt to realize a service at a point in time. Carries a full
/// frozen `service_snapshot` so it survives schema drift on the live
/// `Service` row (see Design Note "Snapshot-over-reference").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub service_id: ServiceId,
    pub hash: String,
    pub workflow_id: String,
    pub slot: Slot,
    pub status: DeploymentStatus,
    pub service_snapshot: serde_json::Value,
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
    pub commit_author_name: Option<String>,
    pub trigger_method: TriggerMethod,
    pub is_redeploy_of: Option<DeploymentId>,
    pub is_current_production: bool,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status_reason: Option<String>,
    pub ignore_build_cache: bool,
    /// The last executor step marker durably completed, e.g.
    /// `"SWARM_SERVICE_CREATED"`. Persisted so a process restart can
    /// resume compensation/rollback from the right point instead of
    /// re-running (or skipping) a step (spec.md §4.4, §9 "Idempotent
    /// naming").
    #[serde(default)]
    pub last_completed_step: Option<String>,
}

impl Deployment {
    /// `srv-<dk|git>-<project.slug>-<service.slug>-<deployment.hash>`
    pub fn runtime_service_name(&self, project_slug: &str, service_slug: &str, is_git: bool) -> String {
        let kind = if is_git { "git" } else { "dk" };
        format!("srv-{kind}-{project_slug}-{service_slug}-{}", self.hash)
    }

    pub fn is_cancellable(&self) -> bool {
        DeploymentStatus::CANCELLABLE.contains(&self.status)
    }
}

/// Ephemeral per-deployment route for a given port; used to address the
/// non-promoted slot while health checking runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentUrl {
    pub id: DeploymentUrlId,
    pub deployment_id: DeploymentId,
    pub port: u16,
    pub domain: String,
}

impl DeploymentUrl {
    /// `deployment:<hash>:<port>`, owned exclusively by one deployment.
    pub fn route_id(&self, deployment_hash: &str) -> String {
        format!("deployment:{deployment_hash}:{}", self.port)
    }
}
