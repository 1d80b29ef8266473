use sqlx::{Sqlite, SqlitePool, Transaction as SqlxTransaction};
use zaneops_common::ids::{EnvironmentId, ServiceId};
use zaneops_common::models::Service;

use crate::error::PersistenceError;

pub async fn fetch(pool: &SqlitePool, id: ServiceId) -> Result<Service, PersistenceError> {
    let row: (String,) = sqlx::query_as("SELECT data FROM services WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(format!("service {id}")))?;
    serde_json::from_str(&row.0).map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

/// Every service in the store, newest-schema-agnostic full scan. The
/// webhook router filters this in memory for repo+branch+auto_deploy
/// matches (spec.md §4.6) -- a single-node PaaS's service count never
/// justifies a bespoke indexed query on top of the JSON blob.
pub async fn all(pool: &SqlitePool) -> Result<Vec<Service>, PersistenceError> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT data FROM services").fetch_all(pool).await?;
    rows.into_iter()
        .map(|(data,)| serde_json::from_str(&data))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

pub async fn for_environment(
    pool: &SqlitePool,
    environment_id: EnvironmentId,
) -> Result<Vec<Service>, PersistenceError> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT data FROM services WHERE environment_id = ?")
        .bind(environment_id.to_string())
        .fetch_all(pool)
        .await?;
    rows.into_iter()
        .map(|(data,)| serde_json::from_str(&data))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

pub async fn by_deploy_token(pool: &SqlitePool, token: &str) -> Result<Service, PersistenceError> {
    all(pool)
        .await?
        .into_iter()
        .find(|s| s.deploy_token == token)
        .ok_or_else(|| PersistenceError::NotFound("service with that deploy token".into()))
}

pub async fn delete(tx: &mut SqlxTransaction<'_, Sqlite>, id: ServiceId) -> Result<(), PersistenceError> {
    sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn upsert(
    tx: &mut SqlxTransaction<'_, Sqlite>,
    service: &Service,
) -> Result<(), PersistenceError> {
    let data = serde_json::to_string(service).map_err(|err| PersistenceError::Corrupt(err.to_string()))?;
    sqlx::query(
        "INSERT INTO services (id, project_id, environment_id, data) VALUES (?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET data = excluded.data",
    )
    .bind(service.id.to_string())
    .bind(service.project_id.to_string())
    .bind(service.environment_id.to_string())
    .bind(data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
