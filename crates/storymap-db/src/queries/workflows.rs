//! Database query functions for `workflows`, `workflow_activities` and `steps`.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Activity, Step, Workflow};

/// Insert a workflow row.
pub async fn insert_workflow(pool: &PgPool, workflow: &Workflow) -> Result<()> {
    sqlx::query(
        "INSERT INTO workflows (id, project_id, title, description, build_state, position) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(workflow.id)
    .bind(workflow.project_id)
    .bind(&workflow.title)
    .bind(&workflow.description)
    .bind(&workflow.build_state)
    .bind(workflow.position)
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert workflow {:?}", workflow.title))?;

    Ok(())
}

/// List a project's workflows in display order.
pub async fn list_workflows_for_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<Workflow>> {
    let rows = sqlx::query_as::<_, Workflow>(
        "SELECT * FROM workflows WHERE project_id = $1 ORDER BY position, id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .context("failed to list workflows")?;

    Ok(rows)
}

/// Insert an activity row.
pub async fn insert_activity(pool: &PgPool, activity: &Activity) -> Result<()> {
    sqlx::query(
        "INSERT INTO workflow_activities (id, workflow_id, title, color, position) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(activity.id)
    .bind(activity.workflow_id)
    .bind(&activity.title)
    .bind(&activity.color)
    .bind(activity.position)
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert activity {:?}", activity.title))?;

    Ok(())
}

/// List every activity under any of the project's workflows.
pub async fn list_activities_for_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<Activity>> {
    let rows = sqlx::query_as::<_, Activity>(
        "SELECT a.* FROM workflow_activities a \
         JOIN workflows w ON w.id = a.workflow_id \
         WHERE w.project_id = $1 \
         ORDER BY a.position, a.id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .context("failed to list activities")?;

    Ok(rows)
}

/// Insert a step row.
pub async fn insert_step(pool: &PgPool, step: &Step) -> Result<()> {
    sqlx::query("INSERT INTO steps (id, activity_id, title, position) VALUES ($1, $2, $3, $4)")
        .bind(step.id)
        .bind(step.activity_id)
        .bind(&step.title)
        .bind(step.position)
        .execute(pool)
        .await
        .with_context(|| format!("failed to insert step {:?}", step.title))?;

    Ok(())
}

/// List every step in the project.
pub async fn list_steps_for_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<Step>> {
    let rows = sqlx::query_as::<_, Step>(
        "SELECT s.* FROM steps s \
         JOIN workflow_activities a ON a.id = s.activity_id \
         JOIN workflows w ON w.id = a.workflow_id \
         WHERE w.project_id = $1 \
         ORDER BY s.position, s.id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .context("failed to list steps")?;

    Ok(rows)
}
