//! Database query functions for `context_artifacts` and the
//! `card_context_artifacts` join table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CardContextLink, ContextArtifact};

/// Insert a context artifact row.
pub async fn insert_context_artifact(pool: &PgPool, artifact: &ContextArtifact) -> Result<()> {
    sqlx::query(
        "INSERT INTO context_artifacts \
         (id, project_id, name, artifact_type, title, content, uri, integration_ref) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(artifact.id)
    .bind(artifact.project_id)
    .bind(&artifact.name)
    .bind(artifact.artifact_type)
    .bind(&artifact.title)
    .bind(&artifact.content)
    .bind(&artifact.uri)
    .bind(&artifact.integration_ref)
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert context artifact {:?}", artifact.name))?;

    Ok(())
}

/// List a project's context artifacts.
pub async fn list_context_artifacts_for_project(
    pool: &PgPool,
    project_id: Uuid,
) -> Result<Vec<ContextArtifact>> {
    let rows = sqlx::query_as::<_, ContextArtifact>(
        "SELECT * FROM context_artifacts WHERE project_id = $1 ORDER BY name",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .context("failed to list context artifacts")?;

    Ok(rows)
}

/// Link a card to an artifact. Re-linking replaces the usage hint.
pub async fn link_card_artifact(pool: &PgPool, link: &CardContextLink) -> Result<()> {
    sqlx::query(
        "INSERT INTO card_context_artifacts (card_id, context_artifact_id, usage_hint) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (card_id, context_artifact_id) DO UPDATE SET usage_hint = EXCLUDED.usage_hint",
    )
    .bind(link.card_id)
    .bind(link.context_artifact_id)
    .bind(&link.usage_hint)
    .execute(pool)
    .await
    .with_context(|| {
        format!(
            "failed to link card {} to artifact {}",
            link.card_id, link.context_artifact_id
        )
    })?;

    Ok(())
}

/// List every card/artifact link in the project.
pub async fn list_card_links_for_project(
    pool: &PgPool,
    project_id: Uuid,
) -> Result<Vec<CardContextLink>> {
    let rows = sqlx::query_as::<_, CardContextLink>(
        "SELECT l.* FROM card_context_artifacts l \
         JOIN context_artifacts ca ON ca.id = l.context_artifact_id \
         WHERE ca.project_id = $1",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .context("failed to list card artifact links")?;

    Ok(rows)
}
