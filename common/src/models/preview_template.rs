use serde::{Deserialize, Serialize};

use crate::ids::{PreviewTemplateId, ProjectId};

/// A blueprint for a sidecar service instantiated alongside the source
/// service in a preview environment (e.g. a throwaway Redis next to the
/// service under test). Deliberately minimal: sidecars are always
/// image-kind, with no URLs of their own, since they exist only to be
/// reachable by the preview's primary service over the project network.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SidecarBlueprint {
    pub slug: String,
    pub image: String,
    pub env_variables: Vec<crate::models::EnvVariable>,
}

/// A project's default recipe for provisioning a preview [`super::Environment`]
/// from a Git PR/MR event (spec.md §4.6, "instantiate ... any
/// template-attached sidecars").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreviewTemplate {
    pub id: PreviewTemplateId,
    pub project_id: ProjectId,
    pub name: String,
    pub sidecars: Vec<SidecarBlueprint>,
}
