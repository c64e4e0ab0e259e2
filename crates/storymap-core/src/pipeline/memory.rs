//! In-memory [`PlanningStore`] for tests and offline use.

use std::collections::HashMap;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use storymap_db::models::{
    ActionRecord, Activity, Card, CardContextLink, KnowledgeItem, PlannedFile, Project, Step,
    Workflow,
};

use super::store::PlanningStore;
use crate::state::PlanningState;

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<Uuid, PlanningState>,
    records: Vec<ActionRecord>,
}

impl Inner {
    /// The graph holding an entity for which `owns` returns true.
    fn owner(
        &mut self,
        what: &str,
        id: Uuid,
        owns: impl Fn(&PlanningState) -> bool,
    ) -> Result<&mut PlanningState> {
        match self.states.values_mut().find(|s| owns(&**s)) {
            Some(state) => Ok(state),
            None => bail!("{what} {id} not found"),
        }
    }
}

/// Project graphs and audit rows held behind one async mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with one project graph.
    pub fn with_state(state: PlanningState) -> Self {
        let mut inner = Inner::default();
        inner.states.insert(state.project.id, state);
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub async fn insert_state(&self, state: PlanningState) {
        self.inner
            .lock()
            .await
            .states
            .insert(state.project.id, state);
    }

    /// Current graph of a project.
    pub async fn snapshot(&self, project_id: Uuid) -> Option<PlanningState> {
        self.inner.lock().await.states.get(&project_id).cloned()
    }
}

#[async_trait]
impl PlanningStore for MemoryStore {
    async fn load_state(&self, project_id: Uuid) -> Result<Option<PlanningState>> {
        Ok(self.snapshot(project_id).await)
    }

    async fn update_project(&self, project: &Project) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.states.get_mut(&project.id) {
            Some(state) => {
                state.project = project.clone();
                Ok(())
            }
            None => bail!("project {} not found", project.id),
        }
    }

    async fn insert_workflow(&self, workflow: &Workflow) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let state = inner.owner("project", workflow.project_id, |s| {
            s.project.id == workflow.project_id
        })?;
        state.workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn insert_activity(&self, activity: &Activity) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let state = inner.owner("workflow", activity.workflow_id, |s| {
            s.workflow_exists(&activity.workflow_id)
        })?;
        state.activities.insert(activity.id, activity.clone());
        Ok(())
    }

    async fn insert_step(&self, step: &Step) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let state = inner.owner("activity", step.activity_id, |s| {
            s.activity_exists(&step.activity_id)
        })?;
        state.steps.insert(step.id, step.clone());
        Ok(())
    }

    async fn insert_card(&self, card: &Card) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let state = inner.owner("activity", card.activity_id, |s| {
            s.activity_exists(&card.activity_id)
        })?;
        state.cards.insert(card.id, card.clone());
        Ok(())
    }

    async fn update_card(&self, card: &Card) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let state = inner.owner("card", card.id, |s| s.card_exists(&card.id))?;
        state.cards.insert(card.id, card.clone());
        Ok(())
    }

    async fn link_context_artifact(&self, link: &CardContextLink) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let state = inner.owner("card", link.card_id, |s| s.card_exists(&link.card_id))?;
        state
            .card_context_links
            .entry(link.card_id)
            .or_default()
            .insert(link.context_artifact_id);
        Ok(())
    }

    async fn upsert_planned_file(&self, file: &PlannedFile) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let state = inner.owner("card", file.card_id, |s| s.card_exists(&file.card_id))?;
        let files = state.card_planned_files.entry(file.card_id).or_default();
        files.retain(|f| f.id != file.id);
        files.push(file.clone());
        files.sort_by_key(|f| f.position);
        Ok(())
    }

    async fn upsert_knowledge_item(&self, item: &KnowledgeItem) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let state = inner.owner("card", item.card_id, |s| s.card_exists(&item.card_id))?;
        let items = state
            .knowledge_items_mut(item.item_type)
            .entry(item.card_id)
            .or_default();
        items.retain(|i| i.id != item.id);
        items.push(item.clone());
        items.sort_by_key(|i| i.position);
        Ok(())
    }

    async fn insert_action_record(&self, record: &ActionRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(key) = &record.idempotency_key {
            let taken = inner.records.iter().any(|r| {
                r.project_id == record.project_id && r.idempotency_key.as_ref() == Some(key)
            });
            if taken {
                bail!("idempotency key {key:?} already recorded");
            }
        }
        inner.records.push(record.clone());
        Ok(())
    }

    async fn find_action_by_idempotency_key(
        &self,
        project_id: Uuid,
        key: &str,
    ) -> Result<Option<ActionRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .iter()
            .find(|r| r.project_id == project_id && r.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn list_action_records(&self, project_id: Uuid) -> Result<Vec<ActionRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect())
    }
}
