use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::ids::{DeploymentChangeId, DeploymentId, ServiceId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeField {
    Source,
    GitSource,
    Builder,
    Command,
    Healthcheck,
    ResourceLimits,
    Volumes,
    Configs,
    Urls,
    Ports,
    EnvVariables,
}

impl ChangeField {
    /// Scalar fields are replaced wholesale; collection fields are merged
    /// item-by-item via `item_id` and benefit from the
    /// delete-before-update-before-add application order.
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            ChangeField::Volumes
                | ChangeField::Configs
                | ChangeField::Urls
                | ChangeField::Ports
                | ChangeField::EnvVariables
        )
    }

    /// `SOURCE`/`GIT_SOURCE`/`BUILDER` are applied last within a batch so
    /// that, if a `BUILDER` change references ports or urls added in the
    /// same batch, those collection members already exist on the service.
    pub fn is_source_like(self) -> bool {
        matches!(
            self,
            ChangeField::Source | ChangeField::GitSource | ChangeField::Builder
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Add,
    Update,
    Delete,
}

/// A pending mutation on a service. While `applied == false` it is part of
/// the next deployment; `apply_pending_changes` flips it to `applied =
/// true` and attributes it to the deployment that applied it inside one
/// transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentChange {
    pub id: DeploymentChangeId,
    pub service_id: ServiceId,
    pub field: ChangeField,
    pub change_type: ChangeType,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
    /// Identifies the collection item being updated/deleted; unset for
    /// `ADD` and for scalar fields.
    pub item_id: Option<String>,
    pub applied: bool,
    pub deployment_id: Option<DeploymentId>,
    pub created_at: DateTime<Utc>,
}

impl DeploymentChange {
    /// Stable application order within one `apply_pending_changes` batch:
    /// collection deletes first (frees up unique slots before inserts land
    /// on them), then collection updates, then collection adds, then
    /// scalar/source-like changes last.
    pub fn application_rank(&self) -> u8 {
        if self.field.is_collection() {
            match self.change_type {
                ChangeType::Delete => 0,
                ChangeType::Update => 1,
                ChangeType::Add => 2,
            }
        } else if self.field.is_source_like() {
            4
        } else {
            3
        }
    }
}
