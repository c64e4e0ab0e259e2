//! Database query functions for the `planning_actions` audit log.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ActionRecord;

/// Insert an audit row. `id` and `created_at` are taken from the record so
/// in-memory and database stores agree on them.
pub async fn insert_action_record(pool: &PgPool, record: &ActionRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO planning_actions \
         (id, project_id, action_id, action_type, target_ref, payload, validation_status, \
          rejection_reason, applied_at, idempotency_key, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(record.id)
    .bind(record.project_id)
    .bind(&record.action_id)
    .bind(&record.action_type)
    .bind(&record.target_ref)
    .bind(&record.payload)
    .bind(record.validation_status)
    .bind(&record.rejection_reason)
    .bind(record.applied_at)
    .bind(&record.idempotency_key)
    .bind(record.created_at)
    .execute(pool)
    .await
    .with_context(|| format!("failed to record action {}", record.action_id))?;

    Ok(())
}

/// Look up a previously recorded action by its idempotency key.
pub async fn find_action_by_idempotency_key(
    pool: &PgPool,
    project_id: Uuid,
    key: &str,
) -> Result<Option<ActionRecord>> {
    let row = sqlx::query_as::<_, ActionRecord>(
        "SELECT * FROM planning_actions WHERE project_id = $1 AND idempotency_key = $2",
    )
    .bind(project_id)
    .bind(key)
    .fetch_optional(pool)
    .await
    .context("failed to look up idempotency key")?;

    Ok(row)
}

/// List a project's audit log, oldest first.
pub async fn list_actions_for_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<ActionRecord>> {
    let rows = sqlx::query_as::<_, ActionRecord>(
        "SELECT * FROM planning_actions WHERE project_id = $1 ORDER BY created_at, id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .context("failed to list planning actions")?;

    Ok(rows)
}
