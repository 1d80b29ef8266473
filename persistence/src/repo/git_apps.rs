use sqlx::{Sqlite, SqlitePool, Transaction as SqlxTransaction};
use zaneops_common::ids::GitAppId;
use zaneops_common::models::GitApp;

use crate::error::PersistenceError;

pub async fn fetch(pool: &SqlitePool, id: GitAppId) -> Result<GitApp, PersistenceError> {
    let row: (String,) = sqlx::query_as("SELECT data FROM git_apps WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(format!("git app {id}")))?;
    serde_json::from_str(&row.0).map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

pub async fn all(pool: &SqlitePool) -> Result<Vec<GitApp>, PersistenceError> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT data FROM git_apps").fetch_all(pool).await?;
    rows.into_iter()
        .map(|(data,)| serde_json::from_str(&data))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| PersistenceError::Corrupt(err.to_string()))
}

pub async fn upsert(tx: &mut SqlxTransaction<'_, Sqlite>, app: &GitApp) -> Result<(), PersistenceError> {
    let data = serde_json::to_string(app).map_err(|err| PersistenceError::Corrupt(err.to_string()))?;
    sqlx::query(
        "INSERT INTO git_apps (id, kind, data) VALUES (?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET kind = excluded.kind, data = excluded.data",
    )
    .bind(app.id.to_string())
    .bind(app.kind.to_string())
    .bind(data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
