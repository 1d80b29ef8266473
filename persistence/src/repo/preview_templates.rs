use sqlx::{Sqlite, Transaction as SqlxTransaction};
use sqlx::SqlitePool;
use zaneops_common::ids::{PreviewTemplateId, ProjectId};
use zaneops_common::models::PreviewTemplate;

use crate::error::PersistenceError;

pub async fn fetch(
    pool: &SqlitePool,
    id: PreviewTemplateId,
) -> Result<PreviewTemplate, PersistenceError> {
    let row: (String,) = sqlx::query_as("SELECT data FROM preview_templates WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(format!("preview template {id}")))?;
    serde_json::from_str(&row.0).map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

/// A project's default preview template, per spec.md §4.6 ("instantiate
/// ... from the project's default preview template"). A project is
/// expected to carry at most one; the first row wins if more exist.
pub async fn default_for_project(
    pool: &SqlitePool,
    project_id: ProjectId,
) -> Result<Option<PreviewTemplate>, PersistenceError> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT data FROM preview_templates WHERE project_id = ? LIMIT 1")
            .bind(project_id.to_string())
            .fetch_optional(pool)
            .await?;
    row.map(|(data,)| serde_json::from_str(&data))
        .transpose()
        .map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

pub async fn upsert(
    tx: &mut SqlxTransaction<'_, Sqlite>,
    template: &PreviewTemplate,
) -> Result<(), PersistenceError> {
    let data = serde_json::to_string(template).map_err(|err| PersistenceError::Corrupt(err.to_string()))?;
    sqlx::query(
        "INSERT INTO preview_templates (id, project_id, data) VALUES (?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET data = excluded.data",
    )
    .bind(template.id.to_string())
    .bind(template.project_id.to_string())
    .bind(data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
