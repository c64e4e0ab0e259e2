//! PostgreSQL-backed [`PlanningStore`].

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use storymap_db::models::{
    ActionRecord, Activity, Card, CardContextLink, KnowledgeItem, PlannedFile, Project, Step,
    Workflow,
};
use storymap_db::queries::{
    actions, artifacts, cards, knowledge, planned_files, projects, workflows,
};

use super::store::PlanningStore;
use crate::state::PlanningState;

/// Store over a connection pool, using the `storymap_db::queries` functions.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PlanningStore for PgStore {
    async fn load_state(&self, project_id: Uuid) -> Result<Option<PlanningState>> {
        let Some(project) = projects::get_project(&self.pool, project_id).await? else {
            return Ok(None);
        };
        let pool = &self.pool;
        let (workflows, activities, steps, cards, artifacts, links, knowledge, files) = tokio::try_join!(
            workflows::list_workflows_for_project(pool, project_id),
            workflows::list_activities_for_project(pool, project_id),
            workflows::list_steps_for_project(pool, project_id),
            cards::list_cards_for_project(pool, project_id),
            artifacts::list_context_artifacts_for_project(pool, project_id),
            artifacts::list_card_links_for_project(pool, project_id),
            knowledge::list_knowledge_items_for_project(pool, project_id),
            planned_files::list_planned_files_for_project(pool, project_id),
        )?;

        Ok(Some(PlanningState::from_parts(
            project, workflows, activities, steps, cards, artifacts, links, knowledge, files,
        )))
    }

    async fn update_project(&self, project: &Project) -> Result<()> {
        projects::update_project(&self.pool, project).await
    }

    async fn insert_workflow(&self, workflow: &Workflow) -> Result<()> {
        workflows::insert_workflow(&self.pool, workflow).await
    }

    async fn insert_activity(&self, activity: &Activity) -> Result<()> {
        workflows::insert_activity(&self.pool, activity).await
    }

    async fn insert_step(&self, step: &Step) -> Result<()> {
        workflows::insert_step(&self.pool, step).await
    }

    async fn insert_card(&self, card: &Card) -> Result<()> {
        cards::insert_card(&self.pool, card).await
    }

    async fn update_card(&self, card: &Card) -> Result<()> {
        cards::update_card(&self.pool, card).await
    }

    async fn link_context_artifact(&self, link: &CardContextLink) -> Result<()> {
        artifacts::link_card_artifact(&self.pool, link).await
    }

    async fn upsert_planned_file(&self, file: &PlannedFile) -> Result<()> {
        planned_files::upsert_planned_file(&self.pool, file).await
    }

    async fn upsert_knowledge_item(&self, item: &KnowledgeItem) -> Result<()> {
        knowledge::upsert_knowledge_item(&self.pool, item).await
    }

    async fn insert_action_record(&self, record: &ActionRecord) -> Result<()> {
        actions::insert_action_record(&self.pool, record).await
    }

    async fn find_action_by_idempotency_key(
        &self,
        project_id: Uuid,
        key: &str,
    ) -> Result<Option<ActionRecord>> {
        actions::find_action_by_idempotency_key(&self.pool, project_id, key).await
    }

    async fn list_action_records(&self, project_id: Uuid) -> Result<Vec<ActionRecord>> {
        actions::list_actions_for_project(&self.pool, project_id).await
    }
}
