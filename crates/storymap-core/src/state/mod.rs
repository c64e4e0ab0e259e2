//! In-memory snapshot of one project's planning graph.
//!
//! A [`PlanningState`] lives for a single validate/preview/apply call. The
//! mutation engine clones it before touching anything, so a state handed to
//! any engine function is never altered.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storymap_db::models::{
    Activity, Card, CardContextLink, ContextArtifact, KnowledgeItem, KnowledgeItemType,
    PlannedFile, Project, Step, Workflow,
};

/// Per-card ordered lists keyed by card id.
pub type CardLists<T> = HashMap<Uuid, Vec<T>>;

/// Full snapshot of a project's workflows, cards, and card knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningState {
    pub project: Project,
    #[serde(default)]
    pub workflows: HashMap<Uuid, Workflow>,
    #[serde(default)]
    pub activities: HashMap<Uuid, Activity>,
    #[serde(default)]
    pub steps: HashMap<Uuid, Step>,
    #[serde(default)]
    pub cards: HashMap<Uuid, Card>,
    #[serde(default)]
    pub context_artifacts: HashMap<Uuid, ContextArtifact>,
    /// card id -> linked artifact ids.
    #[serde(default)]
    pub card_context_links: HashMap<Uuid, HashSet<Uuid>>,
    #[serde(default)]
    pub card_requirements: CardLists<KnowledgeItem>,
    #[serde(default)]
    pub card_facts: CardLists<KnowledgeItem>,
    #[serde(default)]
    pub card_assumptions: CardLists<KnowledgeItem>,
    #[serde(default)]
    pub card_questions: CardLists<KnowledgeItem>,
    #[serde(default)]
    pub card_planned_files: CardLists<PlannedFile>,
}

impl PlanningState {
    /// An empty graph for `project`.
    pub fn empty(project: Project) -> Self {
        Self {
            project,
            workflows: HashMap::new(),
            activities: HashMap::new(),
            steps: HashMap::new(),
            cards: HashMap::new(),
            context_artifacts: HashMap::new(),
            card_context_links: HashMap::new(),
            card_requirements: HashMap::new(),
            card_facts: HashMap::new(),
            card_assumptions: HashMap::new(),
            card_questions: HashMap::new(),
            card_planned_files: HashMap::new(),
        }
    }

    /// Assemble a snapshot from rows listed out of durable storage.
    ///
    /// Knowledge items and planned files are grouped per card and sorted by
    /// `position` so list order is stable regardless of row order.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        project: Project,
        workflows: Vec<Workflow>,
        activities: Vec<Activity>,
        steps: Vec<Step>,
        cards: Vec<Card>,
        artifacts: Vec<ContextArtifact>,
        links: Vec<CardContextLink>,
        knowledge: Vec<KnowledgeItem>,
        planned_files: Vec<PlannedFile>,
    ) -> Self {
        let mut state = Self::empty(project);
        state.workflows = workflows.into_iter().map(|w| (w.id, w)).collect();
        state.activities = activities.into_iter().map(|a| (a.id, a)).collect();
        state.steps = steps.into_iter().map(|s| (s.id, s)).collect();
        state.cards = cards.into_iter().map(|c| (c.id, c)).collect();
        state.context_artifacts = artifacts.into_iter().map(|a| (a.id, a)).collect();

        for link in links {
            state
                .card_context_links
                .entry(link.card_id)
                .or_default()
                .insert(link.context_artifact_id);
        }
        for item in knowledge {
            state
                .knowledge_items_mut(item.item_type)
                .entry(item.card_id)
                .or_default()
                .push(item);
        }
        for file in planned_files {
            state
                .card_planned_files
                .entry(file.card_id)
                .or_default()
                .push(file);
        }

        for kind in KnowledgeItemType::ALL {
            for items in state.knowledge_items_mut(*kind).values_mut() {
                items.sort_by_key(|i| i.position);
            }
        }
        for files in state.card_planned_files.values_mut() {
            files.sort_by_key(|f| f.position);
        }

        state
    }

    // -----------------------------------------------------------------------
    // Existence predicates
    // -----------------------------------------------------------------------

    pub fn workflow_exists(&self, id: &Uuid) -> bool {
        self.workflows.contains_key(id)
    }

    pub fn activity_exists(&self, id: &Uuid) -> bool {
        self.activities.contains_key(id)
    }

    pub fn step_exists(&self, id: &Uuid) -> bool {
        self.steps.contains_key(id)
    }

    pub fn card_exists(&self, id: &Uuid) -> bool {
        self.cards.contains_key(id)
    }

    pub fn context_artifact_exists(&self, id: &Uuid) -> bool {
        self.context_artifacts.contains_key(id)
    }

    // -----------------------------------------------------------------------
    // Knowledge lists
    // -----------------------------------------------------------------------

    /// The per-card list map for one knowledge item type.
    pub fn knowledge_items(&self, kind: KnowledgeItemType) -> &CardLists<KnowledgeItem> {
        match kind {
            KnowledgeItemType::Requirement => &self.card_requirements,
            KnowledgeItemType::Fact => &self.card_facts,
            KnowledgeItemType::Assumption => &self.card_assumptions,
            KnowledgeItemType::Question => &self.card_questions,
        }
    }

    pub fn knowledge_items_mut(&mut self, kind: KnowledgeItemType) -> &mut CardLists<KnowledgeItem> {
        match kind {
            KnowledgeItemType::Requirement => &mut self.card_requirements,
            KnowledgeItemType::Fact => &mut self.card_facts,
            KnowledgeItemType::Assumption => &mut self.card_assumptions,
            KnowledgeItemType::Question => &mut self.card_questions,
        }
    }

    /// Find a knowledge item on a card by id.
    pub fn find_knowledge_item(
        &self,
        kind: KnowledgeItemType,
        card_id: &Uuid,
        item_id: &Uuid,
    ) -> Option<&KnowledgeItem> {
        self.knowledge_items(kind)
            .get(card_id)
            .and_then(|items| items.iter().find(|i| &i.id == item_id))
    }

    /// The type and card of the knowledge item with `item_id`, searched
    /// across all four lists.
    pub fn knowledge_item_owner(&self, item_id: &Uuid) -> Option<(KnowledgeItemType, Uuid)> {
        KnowledgeItemType::ALL.iter().find_map(|&kind| {
            self.knowledge_items(kind)
                .iter()
                .find(|(_, items)| items.iter().any(|i| &i.id == item_id))
                .map(|(card_id, _)| (kind, *card_id))
        })
    }

    /// Find a planned file on a card by id.
    pub fn find_planned_file(&self, card_id: &Uuid, file_id: &Uuid) -> Option<&PlannedFile> {
        self.card_planned_files
            .get(card_id)
            .and_then(|files| files.iter().find(|f| &f.id == file_id))
    }

    /// Whether any entity in the graph already uses `id`.
    pub fn id_in_use(&self, id: &Uuid) -> bool {
        self.project.id == *id
            || self.workflow_exists(id)
            || self.activity_exists(id)
            || self.step_exists(id)
            || self.card_exists(id)
            || self.context_artifact_exists(id)
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }
}

/// Build an empty planning state for `project`.
pub fn create_empty_planning_state(project: Project) -> PlanningState {
    PlanningState::empty(project)
}

/// Deep copy of `state`; no map or set is shared with the original.
pub fn clone_planning_state(state: &PlanningState) -> PlanningState {
    state.clone()
}
