//! Database query functions for the `cards` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Card;

/// Insert a card row.
pub async fn insert_card(pool: &PgPool, card: &Card) -> Result<()> {
    sqlx::query(
        "INSERT INTO cards (id, activity_id, step_id, title, description, status, priority, position) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(card.id)
    .bind(card.activity_id)
    .bind(card.step_id)
    .bind(&card.title)
    .bind(&card.description)
    .bind(card.status)
    .bind(card.priority)
    .bind(card.position)
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert card {:?}", card.title))?;

    Ok(())
}

/// Fetch a card by its ID.
pub async fn get_card(pool: &PgPool, id: Uuid) -> Result<Option<Card>> {
    let card = sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch card")?;

    Ok(card)
}

/// Overwrite the mutable columns of a card (content, status, placement).
pub async fn update_card(pool: &PgPool, card: &Card) -> Result<()> {
    let result = sqlx::query(
        "UPDATE cards \
         SET step_id = $2, title = $3, description = $4, status = $5, priority = $6, position = $7 \
         WHERE id = $1",
    )
    .bind(card.id)
    .bind(card.step_id)
    .bind(&card.title)
    .bind(&card.description)
    .bind(card.status)
    .bind(card.priority)
    .bind(card.position)
    .execute(pool)
    .await
    .context("failed to update card")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("card {} not found", card.id);
    }

    Ok(())
}

/// List every card in the project.
pub async fn list_cards_for_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<Card>> {
    let rows = sqlx::query_as::<_, Card>(
        "SELECT c.* FROM cards c \
         JOIN workflow_activities a ON a.id = c.activity_id \
         JOIN workflows w ON w.id = a.workflow_id \
         WHERE w.project_id = $1 \
         ORDER BY c.position, c.id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .context("failed to list cards")?;

    Ok(rows)
}
