//! Dry runs and all-or-nothing batches on top of the mutation engine.

use serde::Serialize;
use uuid::Uuid;

use crate::action::{ActionKind, ActionType, PlanningAction};
use crate::mutate::{MutationError, apply_action};
use crate::state::PlanningState;

const LABEL_MAX_CHARS: usize = 60;

/// What an action would change, by entity id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewDelta {
    pub action_id: Uuid,
    pub action_type: ActionType,
    pub created_ids: Vec<Uuid>,
    pub updated_ids: Vec<Uuid>,
    pub deleted_ids: Vec<Uuid>,
    pub reordered_ids: Vec<Uuid>,
    /// `"<actionType>: <label>"`, e.g. `"createWorkflow: Browse & Search"`.
    pub summary: String,
}

/// Apply `action` and describe the effect.
pub fn apply_with_delta(
    action: &PlanningAction,
    state: &PlanningState,
) -> Result<(PlanningState, PreviewDelta), MutationError> {
    let next = apply_action(action, state)?;
    let delta = classify(action, state, &next);
    Ok((next, delta))
}

/// Describe what `action` would do to `state`, or `None` if it cannot be
/// applied. The reason for a failure is not reported here.
pub fn preview_action(action: &PlanningAction, state: &PlanningState) -> Option<PreviewDelta> {
    apply_with_delta(action, state).ok().map(|(_, delta)| delta)
}

/// Successful outcome of [`apply_action_batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchApplied {
    pub final_state: PlanningState,
    pub applied_count: usize,
}

/// The batch stopped at `failed_at_index`; nothing from it is applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("action {failed_at_index} failed: {error}")]
pub struct BatchFailure {
    pub failed_at_index: usize,
    pub error: MutationError,
}

/// Apply `actions` in order against a working copy of `state`.
///
/// The first failure discards the working copy, so either every action is
/// applied or none is.
pub fn apply_action_batch(
    actions: &[PlanningAction],
    state: &PlanningState,
) -> Result<BatchApplied, BatchFailure> {
    let mut working = state.clone();
    for (index, action) in actions.iter().enumerate() {
        working = apply_action(action, &working).map_err(|error| BatchFailure {
            failed_at_index: index,
            error,
        })?;
    }
    Ok(BatchApplied {
        final_state: working,
        applied_count: actions.len(),
    })
}

/// Ordered previews for `actions`, each seeing the effects of the ones
/// before it. `None` if any action in the sequence cannot be applied.
pub fn preview_action_batch(
    actions: &[PlanningAction],
    state: &PlanningState,
) -> Option<Vec<PreviewDelta>> {
    let mut working = state.clone();
    let mut deltas = Vec::with_capacity(actions.len());
    for action in actions {
        let (next, delta) = apply_with_delta(action, &working).ok()?;
        working = next;
        deltas.push(delta);
    }
    Some(deltas)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn classify(action: &PlanningAction, before: &PlanningState, after: &PlanningState) -> PreviewDelta {
    let id = action.entity_id();
    let mut delta = PreviewDelta {
        action_id: action.id,
        action_type: action.action_type(),
        created_ids: Vec::new(),
        updated_ids: Vec::new(),
        deleted_ids: Vec::new(),
        reordered_ids: Vec::new(),
        summary: String::new(),
    };

    let label = match &action.kind {
        ActionKind::UpdateProject(_) => {
            delta.updated_ids.push(id);
            after.project.name.clone()
        }
        ActionKind::CreateWorkflow(p) => {
            delta.created_ids.push(id);
            p.title.clone()
        }
        ActionKind::CreateActivity(p) => {
            delta.created_ids.push(id);
            p.title.clone()
        }
        ActionKind::CreateStep(p) => {
            delta.created_ids.push(id);
            p.title.clone()
        }
        ActionKind::CreateCard(p) => {
            delta.created_ids.push(id);
            p.title.clone()
        }
        ActionKind::UpdateCard(p) => {
            delta.updated_ids.push(id);
            card_title(after, p.card_id)
        }
        ActionKind::ReorderCard(p) => {
            delta.reordered_ids.push(id);
            format!("{} -> {}", card_title(after, p.card_id), p.new_position)
        }
        ActionKind::LinkContextArtifact(p) => {
            delta.updated_ids.push(id);
            let artifact = after
                .context_artifacts
                .get(&p.context_artifact_id)
                .map_or_else(|| p.context_artifact_id.to_string(), |a| a.name.clone());
            format!("{} <- {artifact}", card_title(after, p.card_id))
        }
        ActionKind::UpsertPlannedFile(p) => {
            if before.find_planned_file(&p.card_id, &id).is_some() {
                delta.updated_ids.push(id);
            } else {
                delta.created_ids.push(id);
            }
            p.logical_file_name.clone()
        }
        ActionKind::ApprovePlannedFile(p) => {
            delta.updated_ids.push(id);
            let name = after
                .find_planned_file(&p.card_id, &p.planned_file_id)
                .map_or_else(|| id.to_string(), |f| f.logical_file_name.clone());
            format!("{name} ({})", p.status)
        }
        ActionKind::UpsertCardKnowledgeItem(p) => {
            if before.find_knowledge_item(p.item_type, &p.card_id, &id).is_some() {
                delta.updated_ids.push(id);
            } else {
                delta.created_ids.push(id);
            }
            format!("{} {}", p.item_type, shorten(&p.text))
        }
        ActionKind::SetCardKnowledgeStatus(p) => {
            delta.updated_ids.push(id);
            let text = after
                .find_knowledge_item(p.item_type, &p.card_id, &p.knowledge_item_id)
                .map_or_else(|| id.to_string(), |i| shorten(&i.text));
            format!("{text} ({})", p.status)
        }
    };

    delta.summary = format!("{}: {label}", action.action_type());
    delta
}

fn card_title(state: &PlanningState, card_id: Uuid) -> String {
    state
        .cards
        .get(&card_id)
        .map_or_else(|| card_id.to_string(), |c| c.title.clone())
}

fn shorten(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(LABEL_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
