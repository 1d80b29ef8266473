use sqlx::{Sqlite, SqlitePool, Transaction as SqlxTransaction};
use zaneops_common::ids::{DeploymentId, ServiceId};
use zaneops_common::models::{Deployment, DeploymentStatus};

use crate::error::PersistenceError;

pub async fn insert(
    tx: &mut SqlxTransaction<'_, Sqlite>,
    deployment: &Deployment,
) -> Result<(), PersistenceError> {
    let data = serde_json::to_string(deployment).map_err(|err| PersistenceError::Corrupt(err.to_string()))?;
    sqlx::query(
        "INSERT INTO deployments (id, service_id, status, queued_at, is_current_production, data)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(deployment.id.to_string())
    .bind(deployment.service_id.to_string())
    .bind(deployment.status.to_string())
    .bind(deployment.queued_at.to_rfc3339())
    .bind(deployment.is_current_production)
    .bind(data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn save(
    tx: &mut SqlxTransaction<'_, Sqlite>,
    deployment: &Deployment,
) -> Result<(), PersistenceError> {
    let data = serde_json::to_string(deployment).map_err(|err| PersistenceError::Corrupt(err.to_string()))?;
    sqlx::query(
        "UPDATE deployments SET status = ?, is_current_production = ?, data = ? WHERE id = ?",
    )
    .bind(deployment.status.to_string())
    .bind(deployment.is_current_production)
    .bind(data)
    .bind(deployment.id.to_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn fetch(pool: &SqlitePool, id: DeploymentId) -> Result<Deployment, PersistenceError> {
    let row: (String,) = sqlx::query_as("SELECT data FROM deployments WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(format!("deployment {id}")))?;
    serde_json::from_str(&row.0).map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

pub async fn latest_production(
    pool: &SqlitePool,
    service_id: ServiceId,
) -> Result<Option<Deployment>, PersistenceError> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT data FROM deployments
         WHERE service_id = ? AND is_current_production = 1
         ORDER BY queued_at DESC LIMIT 1",
    )
    .bind(service_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|(data,)| serde_json::from_str(&data))
        .transpose()
        .map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

/// Every deployment ever recorded for `service_id`, newest first. Used by
/// environment archival (spec.md §4.6 "closed/merged") to enumerate the
/// runtime services and proxy routes a cascading cleanup must remove.
pub async fn for_service(
    pool: &SqlitePool,
    service_id: ServiceId,
) -> Result<Vec<Deployment>, PersistenceError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT data FROM deployments WHERE service_id = ? ORDER BY queued_at DESC",
    )
    .bind(service_id.to_string())
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|(data,)| serde_json::from_str(&data))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

pub async fn delete(tx: &mut SqlxTransaction<'_, Sqlite>, id: DeploymentId) -> Result<(), PersistenceError> {
    sqlx::query("DELETE FROM deployments WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Deployments queued or in-flight for `service_id`, newest first --
/// grounds the Cancellation Coordinator's `flag_deployments_for_cancellation`
/// (spec.md §4.7).
pub async fn in_flight(
    pool: &SqlitePool,
    service_id: ServiceId,
) -> Result<Vec<Deployment>, PersistenceError> {
    let statuses: Vec<String> = DeploymentStatus::CANCELLABLE
        .iter()
        .map(|s| s.to_string())
        .collect();
    let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!(
        "SELECT data FROM deployments WHERE service_id = ? AND status IN ({placeholders}) ORDER BY queued_at DESC"
    );

    let mut query = sqlx::query_as::<_, (String,)>(&sql).bind(service_id.to_string());
    for status in &statuses {
        query = query.bind(status);
    }

    let rows = query.fetch_all(pool).await?;
    rows.into_iter()
        .map(|(data,)| serde_json::from_str(&data))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| PersistenceError::Corrupt(err.to_string()))
}
