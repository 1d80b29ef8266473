//! Relational store for spec.md §6 "Persisted state layout", backed by
//! `sqlx` against SQLite -- the teacher's `deployer::persistence` connects
//! the same way, one `SqlitePool` behind a `Clone` handle.
//!
//! Each entity keeps a handful of indexed columns (the ones spec.md names
//! explicitly: `(service, status)`, `(service, queued_at DESC)`,
//! `(url.domain, url.base_path)`) plus a `data` JSON column carrying the
//! full `zaneops-common` model, mirroring how `Deployment.service_snapshot`
//! already treats JSON as the system of record for nested shape.

use sqlx::sqlite::SqlitePool;

use crate::error::PersistenceError;
use crate::transaction::Transaction;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        let pool = SqlitePool::connect(url).await?;
        let store = Store { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS services (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                environment_id TEXT NOT NULL,
                data JSON NOT NULL
            );

            CREATE TABLE IF NOT EXISTS deployments (
                id TEXT PRIMARY KEY,
                service_id TEXT NOT NULL,
                status TEXT NOT NULL,
                queued_at TEXT NOT NULL,
                is_current_production INTEGER NOT NULL DEFAULT 0,
                data JSON NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_deployments_service_status
                ON deployments (service_id, status);
            CREATE INDEX IF NOT EXISTS idx_deployments_service_queued_at
                ON deployments (service_id, queued_at DESC);

            CREATE TABLE IF NOT EXISTS deployment_changes (
                id TEXT PRIMARY KEY,
                service_id TEXT NOT NULL,
                applied INTEGER NOT NULL DEFAULT 0,
                deployment_id TEXT,
                data JSON NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_changes_service_applied
                ON deployment_changes (service_id, applied);

            CREATE TABLE IF NOT EXISTS deployment_urls (
                id TEXT PRIMARY KEY,
                deployment_id TEXT NOT NULL,
                domain TEXT NOT NULL,
                base_path TEXT NOT NULL DEFAULT '',
                port INTEGER NOT NULL,
                data JSON NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_urls_domain_path
                ON deployment_urls (domain, base_path);

            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                data JSON NOT NULL
            );

            CREATE TABLE IF NOT EXISTS environments (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                name TEXT NOT NULL,
                is_preview INTEGER NOT NULL DEFAULT 0,
                pr_number INTEGER,
                data JSON NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_environments_project
                ON environments (project_id);

            CREATE TABLE IF NOT EXISTS git_apps (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                data JSON NOT NULL
            );

            CREATE TABLE IF NOT EXISTS preview_templates (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                data JSON NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction, PersistenceError> {
        let tx = self.pool.begin().await?;
        Ok(Transaction::new(tx))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
