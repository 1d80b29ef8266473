use sqlx::{Sqlite, SqlitePool, Transaction as SqlxTransaction};
use zaneops_common::ids::{DeploymentId, ServiceId};
use zaneops_common::models::DeploymentChange;

use crate::error::PersistenceError;

pub async fn pending_for_service(
    pool: &SqlitePool,
    service_id: ServiceId,
) -> Result<Vec<DeploymentChange>, PersistenceError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT data FROM deployment_changes WHERE service_id = ? AND applied = 0",
    )
    .bind(service_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(data,)| serde_json::from_str(&data))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

/// Every change ever recorded for `service_id`, applied or not. Used by
/// environment archival to clear a service's change history alongside the
/// service row itself.
pub async fn all_for_service(
    pool: &SqlitePool,
    service_id: ServiceId,
) -> Result<Vec<DeploymentChange>, PersistenceError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT data FROM deployment_changes WHERE service_id = ?",
    )
    .bind(service_id.to_string())
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|(data,)| serde_json::from_str(&data))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

pub async fn upsert(
    tx: &mut SqlxTransaction<'_, Sqlite>,
    change: &DeploymentChange,
) -> Result<(), PersistenceError> {
    let data = serde_json::to_string(change).map_err(|err| PersistenceError::Corrupt(err.to_string()))?;
    sqlx::query(
        "INSERT INTO deployment_changes (id, service_id, applied, deployment_id, data)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET applied = excluded.applied, deployment_id = excluded.deployment_id, data = excluded.data",
    )
    .bind(change.id.to_string())
    .bind(change.service_id.to_string())
    .bind(change.applied)
    .bind(change.deployment_id.map(|id| id.to_string()))
    .bind(data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn delete(
    tx: &mut SqlxTransaction<'_, Sqlite>,
    id: zaneops_common::ids::DeploymentChangeId,
) -> Result<(), PersistenceError> {
    sqlx::query("DELETE FROM deployment_changes WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn mark_applied(
    tx: &mut SqlxTransaction<'_, Sqlite>,
    change: &DeploymentChange,
    deployment_id: DeploymentId,
) -> Result<(), PersistenceError> {
    let data = serde_json::to_string(change).map_err(|err| PersistenceError::Corrupt(err.to_string()))?;
    sqlx::query(
        "UPDATE deployment_changes SET applied = 1, deployment_id = ?, data = ? WHERE id = ?",
    )
    .bind(deployment_id.to_string())
    .bind(data)
    .bind(change.id.to_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}
