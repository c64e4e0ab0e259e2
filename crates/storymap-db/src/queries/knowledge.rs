//! Database query functions for the `card_knowledge_items` table.
//!
//! Requirements, facts, assumptions and questions share one table keyed by
//! `item_type`.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::KnowledgeItem;

/// Insert a knowledge item, or overwrite it when the id already exists.
pub async fn upsert_knowledge_item(pool: &PgPool, item: &KnowledgeItem) -> Result<()> {
    sqlx::query(
        "INSERT INTO card_knowledge_items \
         (id, card_id, item_type, text, evidence_source, confidence, status, source, position) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (id) DO UPDATE SET \
             text = EXCLUDED.text, \
             evidence_source = EXCLUDED.evidence_source, \
             confidence = EXCLUDED.confidence, \
             status = EXCLUDED.status, \
             source = EXCLUDED.source, \
             position = EXCLUDED.position",
    )
    .bind(item.id)
    .bind(item.card_id)
    .bind(item.item_type)
    .bind(&item.text)
    .bind(&item.evidence_source)
    .bind(item.confidence)
    .bind(item.status)
    .bind(item.source)
    .bind(item.position)
    .execute(pool)
    .await
    .with_context(|| format!("failed to upsert {} {}", item.item_type, item.id))?;

    Ok(())
}

/// List every knowledge item in the project, in card/position order.
pub async fn list_knowledge_items_for_project(
    pool: &PgPool,
    project_id: Uuid,
) -> Result<Vec<KnowledgeItem>> {
    let rows = sqlx::query_as::<_, KnowledgeItem>(
        "SELECT k.* FROM card_knowledge_items k \
         JOIN cards c ON c.id = k.card_id \
         JOIN workflow_activities a ON a.id = c.activity_id \
         JOIN workflows w ON w.id = a.workflow_id \
         WHERE w.project_id = $1 \
         ORDER BY k.card_id, k.position, k.id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .context("failed to list knowledge items")?;

    Ok(rows)
}
