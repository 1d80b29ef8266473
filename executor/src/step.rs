//! The step markers named in spec.md §4.4, persisted on
//! [`zaneops_common::models::Deployment::last_completed_step`] after each
//! step so a process restart -- or a cancellation that lands after a step
//! already finished -- can resume compensation from the right point
//! (spec.md §9 "Idempotent naming").

use strum::{Display, EnumString};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StepMarker {
    Initialized,
    CloningRepository,
    RepositoryCloned,
    BuildingImage,
    ImageBuilt,
    VolumesCreated,
    ConfigsCreated,
    PreviousDeploymentScaledDown,
    SwarmServiceCreated,
    DeploymentExposedToHttp,
    ServiceExposedToHttp,
    Finished,
}

impl StepMarker {
    /// Whether a rollback at this marker must undo the swarm service
    /// created at `SWARM_SERVICE_CREATED` or later -- the boundary spec.md
    /// §4.4's "Failure semantics" draws between the two compensation
    /// paths.
    pub fn is_at_or_after_swarm_service_created(self) -> bool {
        matches!(
            self,
            StepMarker::SwarmServiceCreated
                | StepMarker::DeploymentExposedToHttp
                | StepMarker::ServiceExposedToHttp
                | StepMarker::Finished
        )
    }
}
