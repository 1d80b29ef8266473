//! Cancellation Coordinator (spec.md §4.7): flags pending deployments,
//! signals active workflows, and backs the queue-cleanup endpoints a deploy
//! request or an operator action drives.

use chrono::Utc;
use tracing::instrument;

use zaneops_common::ids::ServiceId;
use zaneops_common::models::{Deployment, DeploymentStatus};
use zaneops_executor::CancelRegistry;
use zaneops_persistence::{repo, Store};

use crate::error::CancellationError;

#[derive(Clone)]
pub struct CancellationCoordinator {
    store: Store,
    cancel_registry: CancelRegistry,
}

impl CancellationCoordinator {
    pub fn new(store: Store, cancel_registry: CancelRegistry) -> Self {
        Self {
            store,
            cancel_registry,
        }
    }

    /// Selects `service`'s in-flight deployments. A deployment that never
    /// started is cancelled in place; one already running is handed back
    /// for the caller to signal (via [`Self::cancel`]) once the caller has
    /// decided, via `include_running`, whether running deployments are in
    /// scope at all.
    #[instrument(skip(self), fields(service_id = %service_id))]
    pub async fn flag_deployments_for_cancellation(
        &self,
        service_id: ServiceId,
        include_running: bool,
    ) -> Result<Vec<Deployment>, CancellationError> {
        let candidates = repo::deployments::in_flight(self.store.pool(), service_id).await?;
        let mut signalled = Vec::new();

        for mut deployment in candidates {
            if !include_running && deployment.started_at.is_some() {
                continue;
            }

            if deployment.started_at.is_none() {
                deployment.status = DeploymentStatus::Cancelled;
                deployment.status_reason = Some("Cancelled due to superseding deployment".to_string());
                deployment.finished_at = Some(Utc::now());
                self.save(&deployment).await?;
            } else {
                signalled.push(deployment);
            }
        }

        Ok(signalled)
    }

    /// Cancels a single deployment: flips it directly to CANCELLED if it
    /// never started, otherwise signals its workflow for the executor to
    /// acknowledge at its next suspension point (spec.md §5).
    #[instrument(skip(self, deployment), fields(deployment_id = %deployment.id))]
    pub async fn cancel(&self, deployment: &mut Deployment, reason: &str) -> Result<(), CancellationError> {
        if deployment.finished_at.is_some() {
            return Err(CancellationError::AlreadyTerminal);
        }
        if deployment.status == DeploymentStatus::Cancelled {
            return Err(CancellationError::AlreadyCancelling);
        }

        if deployment.started_at.is_none() {
            deployment.status = DeploymentStatus::Cancelled;
            deployment.status_reason = Some(reason.to_string());
            deployment.finished_at = Some(Utc::now());
            self.save(deployment).await?;
        } else {
            self.cancel_registry.signal(&deployment.workflow_id).await;
        }

        Ok(())
    }

    /// Drives queue cleanup for `service_id`: flags every queued deployment
    /// for cancellation, and additionally signals running ones when
    /// `cancel_running_deployments` is set. Used both by the standalone
    /// cleanup-queue endpoint and by a deploy request carrying
    /// `cleanup_queue: true`.
    #[instrument(skip(self), fields(service_id = %service_id))]
    pub async fn cleanup_queue(
        &self,
        service_id: ServiceId,
        cancel_running_deployments: bool,
    ) -> Result<(), CancellationError> {
        let running = self
            .flag_deployments_for_cancellation(service_id, cancel_running_deployments)
            .await?;

        if cancel_running_deployments {
            for deployment in &running {
                self.cancel_registry.signal(&deployment.workflow_id).await;
            }
        }

        Ok(())
    }

    async fn save(&self, deployment: &Deployment) -> Result<(), CancellationError> {
        let mut tx = self.store.begin().await?;
        repo::deployments::save(tx.as_mut(), deployment).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use zaneops_common::ids::{DeploymentId, ServiceId};
    use zaneops_common::models::{Deployment, DeploymentStatus, Slot, TriggerMethod};

    fn queued_deployment(service_id: ServiceId) -> Deployment {
        Deployment {
            id: DeploymentId::new(),
            service_id,
            hash: "abcd1234".into(),
            workflow_id: "wf-1".into(),
            slot: Slot::Blue,
            status: DeploymentStatus::Queued,
            service_snapshot: serde_json::json!({}),
            commit_sha: None,
            commit_message: None,
            commit_author_name: None,
            trigger_method: TriggerMethod::Manual,
            is_redeploy_of: None,
            is_current_production: false,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            status_reason: None,
            ignore_build_cache: false,
            last_completed_step: None,
        }
    }

    async fn coordinator() -> (CancellationCoordinator, Store) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let coordinator = CancellationCoordinator::new(store.clone(), CancelRegistry::new());
        (coordinator, store)
    }

    #[tokio::test]
    async fn a_never_started_deployment_is_cancelled_in_place() {
        let (coordinator, store) = coordinator().await;
        let service_id = ServiceId::new();
        let deployment = queued_deployment(service_id);

        let mut tx = store.begin().await.unwrap();
        repo::deployments::insert(tx.as_mut(), &deployment).await.unwrap();
        tx.commit().await.unwrap();

        let signalled = coordinator
            .flag_deployments_for_cancellation(service_id, false)
            .await
            .unwrap();
        assert!(signalled.is_empty());

        let fetched = repo::deployments::fetch(store.pool(), deployment.id).await.unwrap();
        assert_eq!(fetched.status, DeploymentStatus::Cancelled);
        assert!(fetched.finished_at.is_some());
    }

    #[tokio::test]
    async fn a_running_deployment_is_returned_for_signalling_only_when_included() {
        let (coordinator, store) = coordinator().await;
        let service_id = ServiceId::new();
        let mut deployment = queued_deployment(service_id);
        deployment.status = DeploymentStatus::Building;
        deployment.started_at = Some(Utc::now());

        let mut tx = store.begin().await.unwrap();
        repo::deployments::insert(tx.as_mut(), &deployment).await.unwrap();
        tx.commit().await.unwrap();

        let excluded = coordinator
            .flag_deployments_for_cancellation(service_id, false)
            .await
            .unwrap();
        assert!(excluded.is_empty());

        let included = coordinator
            .flag_deployments_for_cancellation(service_id, true)
            .await
            .unwrap();
        assert_eq!(included.len(), 1);
        assert_eq!(included[0].id, deployment.id);
    }

    #[tokio::test]
    async fn cancel_on_a_started_deployment_signals_rather_than_flips_status() {
        let (coordinator, store) = coordinator().await;
        let service_id = ServiceId::new();
        let mut deployment = queued_deployment(service_id);
        deployment.status = DeploymentStatus::Building;
        deployment.started_at = Some(Utc::now());

        let mut tx = store.begin().await.unwrap();
        repo::deployments::insert(tx.as_mut(), &deployment).await.unwrap();
        tx.commit().await.unwrap();

        let handle = coordinator.cancel_registry.subscribe(&deployment.workflow_id).await;
        coordinator.cancel(&mut deployment, "operator requested").await.unwrap();

        assert_eq!(deployment.status, DeploymentStatus::Building);
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_on_a_terminal_deployment_is_a_conflict() {
        let (coordinator, _store) = coordinator().await;
        let mut deployment = queued_deployment(ServiceId::new());
        deployment.status = DeploymentStatus::Healthy;
        deployment.finished_at = Some(Utc::now());

        let result = coordinator.cancel(&mut deployment, "too late").await;
        assert!(matches!(result, Err(CancellationError::AlreadyTerminal)));
    }
}
