//! The `PlanningStore` trait -- durable storage as seen by the pipeline.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use storymap_db::models::{
    ActionRecord, Activity, Card, CardContextLink, KnowledgeItem, PlannedFile, Project, Step,
    Workflow,
};

use crate::state::PlanningState;

/// Entity-level persistence plus the action audit log.
///
/// One write method per kind of effect an action can have; the pipeline
/// calls exactly one of them per applied action.
#[async_trait]
pub trait PlanningStore: Send + Sync {
    /// Snapshot of a project's whole graph, or `None` if the project does
    /// not exist.
    async fn load_state(&self, project_id: Uuid) -> Result<Option<PlanningState>>;

    async fn update_project(&self, project: &Project) -> Result<()>;
    async fn insert_workflow(&self, workflow: &Workflow) -> Result<()>;
    async fn insert_activity(&self, activity: &Activity) -> Result<()>;
    async fn insert_step(&self, step: &Step) -> Result<()>;
    async fn insert_card(&self, card: &Card) -> Result<()>;
    async fn update_card(&self, card: &Card) -> Result<()>;
    async fn link_context_artifact(&self, link: &CardContextLink) -> Result<()>;
    async fn upsert_planned_file(&self, file: &PlannedFile) -> Result<()>;
    async fn upsert_knowledge_item(&self, item: &KnowledgeItem) -> Result<()>;

    /// Append one audit row. Fails if the row's idempotency key is already
    /// recorded for its project.
    async fn insert_action_record(&self, record: &ActionRecord) -> Result<()>;

    async fn find_action_by_idempotency_key(
        &self,
        project_id: Uuid,
        key: &str,
    ) -> Result<Option<ActionRecord>>;

    /// Audit rows for a project, oldest first.
    async fn list_action_records(&self, project_id: Uuid) -> Result<Vec<ActionRecord>>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PlanningStore) {}
};
