use sqlx::{Sqlite, SqlitePool, Transaction as SqlxTransaction};
use zaneops_common::ids::DeploymentId;
use zaneops_common::models::DeploymentUrl;

use crate::error::PersistenceError;

pub async fn insert(
    tx: &mut SqlxTransaction<'_, Sqlite>,
    url: &DeploymentUrl,
) -> Result<(), PersistenceError> {
    let data = serde_json::to_string(url).map_err(|err| PersistenceError::Corrupt(err.to_string()))?;
    sqlx::query(
        "INSERT INTO deployment_urls (id, deployment_id, domain, base_path, port, data)
         VALUES (?, ?, ?, '', ?, ?)",
    )
    .bind(url.id.to_string())
    .bind(url.deployment_id.to_string())
    .bind(&url.domain)
    .bind(url.port as i64)
    .bind(data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn delete_for_deployment(
    tx: &mut SqlxTransaction<'_, Sqlite>,
    deployment_id: DeploymentId,
) -> Result<(), PersistenceError> {
    sqlx::query("DELETE FROM deployment_urls WHERE deployment_id = ?")
        .bind(deployment_id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn for_deployment(
    pool: &SqlitePool,
    deployment_id: DeploymentId,
) -> Result<Vec<DeploymentUrl>, PersistenceError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT data FROM deployment_urls WHERE deployment_id = ?",
    )
    .bind(deployment_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(data,)| serde_json::from_str(&data))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| PersistenceError::Corrupt(err.to_string()))
}
