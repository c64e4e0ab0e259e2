//! Database query functions for the `card_planned_files` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::PlannedFile;

/// Insert a planned file, or overwrite it when the id already exists.
pub async fn upsert_planned_file(pool: &PgPool, file: &PlannedFile) -> Result<()> {
    sqlx::query(
        "INSERT INTO card_planned_files \
         (id, card_id, logical_file_name, module_hint, artifact_kind, action, \
          intent_summary, contract_notes, status, position) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (id) DO UPDATE SET \
             logical_file_name = EXCLUDED.logical_file_name, \
             module_hint = EXCLUDED.module_hint, \
             artifact_kind = EXCLUDED.artifact_kind, \
             action = EXCLUDED.action, \
             intent_summary = EXCLUDED.intent_summary, \
             contract_notes = EXCLUDED.contract_notes, \
             status = EXCLUDED.status, \
             position = EXCLUDED.position",
    )
    .bind(file.id)
    .bind(file.card_id)
    .bind(&file.logical_file_name)
    .bind(&file.module_hint)
    .bind(file.artifact_kind)
    .bind(file.action)
    .bind(&file.intent_summary)
    .bind(&file.contract_notes)
    .bind(file.status)
    .bind(file.position)
    .execute(pool)
    .await
    .with_context(|| format!("failed to upsert planned file {:?}", file.logical_file_name))?;

    Ok(())
}

/// List every planned file in the project, in card/position order.
pub async fn list_planned_files_for_project(
    pool: &PgPool,
    project_id: Uuid,
) -> Result<Vec<PlannedFile>> {
    let rows = sqlx::query_as::<_, PlannedFile>(
        "SELECT f.* FROM card_planned_files f \
         JOIN cards c ON c.id = f.card_id \
         JOIN workflow_activities a ON a.id = c.activity_id \
         JOIN workflows w ON w.id = a.workflow_id \
         WHERE w.project_id = $1 \
         ORDER BY f.card_id, f.position, f.id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .context("failed to list planned files")?;

    Ok(rows)
}
