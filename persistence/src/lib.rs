//! Relational store (SQLite via `sqlx`) plus post-commit hooks --
//! **(expansion)** named in SPEC_FULL.md §2, grounded on the teacher's
//! `deployer::persistence` module and spec.md §6 "Persisted state layout".

pub mod error;
pub mod repo;
pub mod store;
pub mod transaction;

pub use error::PersistenceError;
pub use store::Store;
pub use transaction::Transaction;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use zaneops_common::ids::{EnvironmentId, ProjectId, ServiceId};
    use zaneops_common::models::{ResourceLimits, Service, ServiceSource};

    fn sample_service() -> Service {
        Service {
            id: ServiceId::new(),
            project_id: ProjectId::new(),
            environment_id: EnvironmentId::new(),
            slug: "web".into(),
            unprefixed_id: "x".into(),
            source: ServiceSource::Image {
                image: "nginx".into(),
                credentials: None,
            },
            command: None,
            healthcheck: None,
            resource_limits: ResourceLimits::default(),
            volumes: vec![],
            configs: vec![],
            ports: vec![],
            urls: vec![],
            env_variables: vec![],
            deploy_token: "tok".into(),
            watch_paths: None,
            auto_deploy: true,
            current_production_deployment_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn roundtrips_a_service_through_a_committed_transaction() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let service = sample_service();

        let mut tx = store.begin().await.unwrap();
        repo::services::upsert(tx.as_mut(), &service).await.unwrap();
        tx.commit().await.unwrap();

        let fetched = repo::services::fetch(store.pool(), service.id).await.unwrap();
        assert_eq!(fetched.slug, service.slug);
    }

    #[tokio::test]
    async fn on_commit_hooks_do_not_run_on_rollback() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let service = sample_service();

        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired_clone = fired.clone();

        let mut tx = store.begin().await.unwrap();
        repo::services::upsert(tx.as_mut(), &service).await.unwrap();
        tx.on_commit(move || fired_clone.store(true, std::sync::atomic::Ordering::SeqCst));
        tx.rollback().await.unwrap();

        assert!(!fired.load(std::sync::atomic::Ordering::SeqCst));
        assert!(repo::services::fetch(store.pool(), service.id).await.is_err());
    }
}
