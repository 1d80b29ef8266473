use sqlx::{Sqlite, SqlitePool, Transaction as SqlxTransaction};
use zaneops_common::ids::{EnvironmentId, ProjectId};
use zaneops_common::models::Environment;

use crate::error::PersistenceError;

pub async fn fetch(pool: &SqlitePool, id: EnvironmentId) -> Result<Environment, PersistenceError> {
    let row: (String,) = sqlx::query_as("SELECT data FROM environments WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(format!("environment {id}")))?;
    serde_json::from_str(&row.0).map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

pub async fn for_project(
    pool: &SqlitePool,
    project_id: ProjectId,
) -> Result<Vec<Environment>, PersistenceError> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT data FROM environments WHERE project_id = ?")
        .bind(project_id.to_string())
        .fetch_all(pool)
        .await?;
    rows.into_iter()
        .map(|(data,)| serde_json::from_str(&data))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

/// Every preview environment, used by the webhook router to find the
/// environment owned by an already-open PR/MR (spec.md §4.6, "a preview
/// environment is idempotent: reopening produces no new environment").
pub async fn all_previews(pool: &SqlitePool) -> Result<Vec<Environment>, PersistenceError> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT data FROM environments WHERE is_preview = 1")
        .fetch_all(pool)
        .await?;
    rows.into_iter()
        .map(|(data,)| serde_json::from_str(&data))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

pub async fn upsert(
    tx: &mut SqlxTransaction<'_, Sqlite>,
    environment: &Environment,
) -> Result<(), PersistenceError> {
    let data = serde_json::to_string(environment).map_err(|err| PersistenceError::Corrupt(err.to_string()))?;
    let pr_number = environment
        .preview_metadata
        .as_ref()
        .and_then(|m| m.pr_number)
        .map(|n| n as i64);
    sqlx::query(
        "INSERT INTO environments (id, project_id, name, is_preview, pr_number, data)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name, is_preview = excluded.is_preview,
            pr_number = excluded.pr_number, data = excluded.data",
    )
    .bind(environment.id.to_string())
    .bind(environment.project_id.to_string())
    .bind(&environment.name)
    .bind(environment.is_preview())
    .bind(pr_number)
    .bind(data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn delete(
    tx: &mut SqlxTransaction<'_, Sqlite>,
    id: EnvironmentId,
) -> Result<(), PersistenceError> {
    sqlx::query("DELETE FROM environments WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}
