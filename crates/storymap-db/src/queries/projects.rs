//! Database query functions for the `projects` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Project;

/// Insert a project row with a caller-chosen id.
pub async fn insert_project(pool: &PgPool, project: &Project) -> Result<Project> {
    let row = sqlx::query_as::<_, Project>(
        "INSERT INTO projects \
         (id, name, description, tech_stack, deployment, design_inspiration, repo_url, default_branch) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING *",
    )
    .bind(project.id)
    .bind(&project.name)
    .bind(&project.description)
    .bind(&project.tech_stack)
    .bind(&project.deployment)
    .bind(&project.design_inspiration)
    .bind(&project.repo_url)
    .bind(&project.default_branch)
    .fetch_one(pool)
    .await
    .context("failed to insert project")?;

    Ok(row)
}

/// Fetch a project by its ID.
pub async fn get_project(pool: &PgPool, id: Uuid) -> Result<Option<Project>> {
    let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch project")?;

    Ok(project)
}

/// List all projects, oldest first.
pub async fn list_projects(pool: &PgPool) -> Result<Vec<Project>> {
    let projects = sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY created_at")
        .fetch_all(pool)
        .await
        .context("failed to list projects")?;

    Ok(projects)
}

/// Overwrite every mutable column of a project.
pub async fn update_project(pool: &PgPool, project: &Project) -> Result<()> {
    let result = sqlx::query(
        "UPDATE projects \
         SET name = $2, description = $3, tech_stack = $4, deployment = $5, \
             design_inspiration = $6, repo_url = $7, default_branch = $8 \
         WHERE id = $1",
    )
    .bind(project.id)
    .bind(&project.name)
    .bind(&project.description)
    .bind(&project.tech_stack)
    .bind(&project.deployment)
    .bind(&project.design_inspiration)
    .bind(&project.repo_url)
    .bind(&project.default_branch)
    .execute(pool)
    .await
    .context("failed to update project")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("project {} not found", project.id);
    }

    Ok(())
}
