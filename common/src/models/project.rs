use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ProjectId;

/// Logical grouping; owns a shared overlay network and a set of
/// [`crate::models::Environment`]s.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// `net-<project.slug>-<project.ts>`, stable for the lifetime of the
    /// project so retried `NetworkCreate` calls are idempotent.
    pub fn network_name(&self) -> String {
        format!(
            "net-{}-{}",
            self.slug,
            self.created_at.timestamp_micros()
        )
    }
}
