use sqlx::{Sqlite, SqlitePool, Transaction as SqlxTransaction};
use zaneops_common::ids::ProjectId;
use zaneops_common::models::Project;

use crate::error::PersistenceError;

pub async fn fetch(pool: &SqlitePool, id: ProjectId) -> Result<Project, PersistenceError> {
    let row: (String,) = sqlx::query_as("SELECT data FROM projects WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(format!("project {id}")))?;
    serde_json::from_str(&row.0).map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

pub async fn upsert(
    tx: &mut SqlxTransaction<'_, Sqlite>,
    project: &Project,
) -> Result<(), PersistenceError> {
    let data = serde_json::to_string(project).map_err(|err| PersistenceError::Corrupt(err.to_string()))?;
    sqlx::query(
        "INSERT INTO projects (id, slug, data) VALUES (?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET data = excluded.data",
    )
    .bind(project.id.to_string())
    .bind(&project.slug)
    .bind(data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
