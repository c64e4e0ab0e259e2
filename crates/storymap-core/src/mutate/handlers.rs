//! One handler per action kind. Each writes only the entities it owns.

use serde_json::json;
use uuid::Uuid;

use storymap_db::models::{
    Activity, Card, CardStatus, KnowledgeItem, KnowledgeSource, KnowledgeStatus, PlannedFile,
    PlannedFileStatus, Step, Workflow,
};

use super::MutationError;
use crate::action::{
    ActionKind, ApprovePlannedFile, CreateActivity, CreateCard, CreateStep, CreateWorkflow,
    LinkContextArtifact, PlanningAction, ReorderCard, SetCardKnowledgeStatus, UpdateCard,
    UpdateProject, UpsertCardKnowledgeItem, UpsertPlannedFile,
};
use crate::state::PlanningState;

type HandlerResult = Result<(), MutationError>;

pub(super) fn dispatch(action: &PlanningAction, state: &mut PlanningState) -> HandlerResult {
    let id = action.entity_id();
    match &action.kind {
        ActionKind::UpdateProject(p) => update_project(p, state),
        ActionKind::CreateWorkflow(p) => create_workflow(id, p, state),
        ActionKind::CreateActivity(p) => create_activity(id, p, state),
        ActionKind::CreateStep(p) => create_step(id, p, state),
        ActionKind::CreateCard(p) => create_card(id, p, state),
        ActionKind::UpdateCard(p) => update_card(p, state),
        ActionKind::ReorderCard(p) => reorder_card(p, state),
        ActionKind::LinkContextArtifact(p) => link_context_artifact(p, state),
        ActionKind::UpsertPlannedFile(p) => upsert_planned_file(id, p, state),
        ActionKind::ApprovePlannedFile(p) => approve_planned_file(p, state),
        ActionKind::UpsertCardKnowledgeItem(p) => upsert_knowledge_item(id, p, state),
        ActionKind::SetCardKnowledgeStatus(p) => set_knowledge_status(p, state),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn not_found(entity: &str, id: Uuid) -> MutationError {
    MutationError::mutation_failed(format!("{entity} {id} not found"))
        .with_details(json!({ "entity": entity, "id": id }))
}

fn non_negative(field: &str, value: i32) -> Result<i32, MutationError> {
    if value < 0 {
        return Err(MutationError::constraint_violation(format!(
            "{field} must not be negative, got {value}"
        ))
        .with_details(json!({ "field": field, "value": value })));
    }
    Ok(value)
}

/// The explicit position, or one past the last sibling.
fn position_or_append(
    explicit: Option<i32>,
    siblings: impl Iterator<Item = i32>,
) -> Result<i32, MutationError> {
    match explicit {
        Some(p) => non_negative("position", p),
        None => match siblings.max() {
            None => Ok(0),
            Some(max) => max.checked_add(1).ok_or_else(|| {
                MutationError::constraint_violation(format!(
                    "cannot append after position {max}"
                ))
                .with_details(json!({ "field": "position", "value": max }))
            }),
        },
    }
}

fn ensure_fresh(state: &PlanningState, id: Uuid) -> HandlerResult {
    if state.id_in_use(&id) {
        return Err(MutationError::constraint_violation(format!("id {id} is already in use"))
            .with_details(json!({ "id": id })));
    }
    Ok(())
}

fn require_card(state: &PlanningState, card_id: Uuid) -> HandlerResult {
    if state.card_exists(&card_id) {
        Ok(())
    } else {
        Err(not_found("card", card_id))
    }
}

// ---------------------------------------------------------------------------
// Project and structure
// ---------------------------------------------------------------------------

fn update_project(p: &UpdateProject, state: &mut PlanningState) -> HandlerResult {
    if p.project_id != state.project.id {
        return Err(not_found("project", p.project_id));
    }
    let project = &mut state.project;
    if let Some(name) = &p.name {
        project.name = name.clone();
    }
    if let Some(v) = &p.description {
        project.description = Some(v.clone());
    }
    if let Some(v) = &p.tech_stack {
        project.tech_stack = Some(v.clone());
    }
    if let Some(v) = &p.deployment {
        project.deployment = Some(v.clone());
    }
    if let Some(v) = &p.design_inspiration {
        project.design_inspiration = Some(v.clone());
    }
    if let Some(v) = &p.repo_url {
        project.repo_url = Some(v.clone());
    }
    if let Some(branch) = &p.default_branch {
        project.default_branch = branch.clone();
    }
    Ok(())
}

fn create_workflow(id: Uuid, p: &CreateWorkflow, state: &mut PlanningState) -> HandlerResult {
    if p.project_id != state.project.id {
        return Err(not_found("project", p.project_id));
    }
    ensure_fresh(state, id)?;
    let position = position_or_append(p.position, state.workflows.values().map(|w| w.position))?;
    state.workflows.insert(
        id,
        Workflow {
            id,
            project_id: p.project_id,
            title: p.title.clone(),
            description: p.description.clone(),
            build_state: None,
            position,
        },
    );
    Ok(())
}

fn create_activity(id: Uuid, p: &CreateActivity, state: &mut PlanningState) -> HandlerResult {
    if !state.workflow_exists(&p.workflow_id) {
        return Err(not_found("workflow", p.workflow_id));
    }
    ensure_fresh(state, id)?;
    let siblings = state
        .activities
        .values()
        .filter(|a| a.workflow_id == p.workflow_id)
        .map(|a| a.position);
    let position = position_or_append(p.position, siblings)?;
    state.activities.insert(
        id,
        Activity {
            id,
            workflow_id: p.workflow_id,
            title: p.title.clone(),
            color: p.color.clone(),
            position,
        },
    );
    Ok(())
}

fn create_step(id: Uuid, p: &CreateStep, state: &mut PlanningState) -> HandlerResult {
    if !state.activity_exists(&p.workflow_activity_id) {
        return Err(not_found("activity", p.workflow_activity_id));
    }
    ensure_fresh(state, id)?;
    let siblings = state
        .steps
        .values()
        .filter(|s| s.activity_id == p.workflow_activity_id)
        .map(|s| s.position);
    let position = position_or_append(p.position, siblings)?;
    state.steps.insert(
        id,
        Step {
            id,
            activity_id: p.workflow_activity_id,
            title: p.title.clone(),
            position,
        },
    );
    Ok(())
}

/// A step, when given, must exist and sit under `activity_id`.
fn check_step(state: &PlanningState, step_id: Uuid, activity_id: Uuid) -> HandlerResult {
    let step = state.steps.get(&step_id).ok_or_else(|| not_found("step", step_id))?;
    if step.activity_id != activity_id {
        return Err(MutationError::constraint_violation(format!(
            "step {step_id} is not under activity {activity_id}"
        ))
        .with_details(json!({ "step_id": step_id, "activity_id": activity_id })));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Cards
// ---------------------------------------------------------------------------

fn create_card(id: Uuid, p: &CreateCard, state: &mut PlanningState) -> HandlerResult {
    if !state.activity_exists(&p.workflow_activity_id) {
        return Err(not_found("activity", p.workflow_activity_id));
    }
    if let Some(step_id) = p.step_id {
        check_step(state, step_id, p.workflow_activity_id)?;
    }
    ensure_fresh(state, id)?;

    let siblings = state
        .cards
        .values()
        .filter(|c| c.activity_id == p.workflow_activity_id && c.step_id == p.step_id)
        .map(|c| c.position);
    let position = position_or_append(p.position, siblings)?;
    let priority = non_negative("priority", p.priority.unwrap_or(0))?;

    state.cards.insert(
        id,
        Card {
            id,
            activity_id: p.workflow_activity_id,
            step_id: p.step_id,
            title: p.title.clone(),
            description: p.description.clone(),
            status: p.status.unwrap_or(CardStatus::Todo),
            priority,
            position,
        },
    );
    Ok(())
}

fn update_card(p: &UpdateCard, state: &mut PlanningState) -> HandlerResult {
    let priority = p.priority.map(|v| non_negative("priority", v)).transpose()?;
    let card = state
        .cards
        .get_mut(&p.card_id)
        .ok_or_else(|| not_found("card", p.card_id))?;

    if let Some(title) = &p.title {
        card.title = title.clone();
    }
    if let Some(description) = &p.description {
        card.description = Some(description.clone());
    }
    if let Some(status) = p.status {
        card.status = status;
    }
    if let Some(priority) = priority {
        card.priority = priority;
    }
    Ok(())
}

fn reorder_card(p: &ReorderCard, state: &mut PlanningState) -> HandlerResult {
    let position = non_negative("new_position", p.new_position)?;
    let activity_id = state
        .cards
        .get(&p.card_id)
        .map(|c| c.activity_id)
        .ok_or_else(|| not_found("card", p.card_id))?;
    if let Some(Some(step_id)) = p.step_id {
        check_step(state, step_id, activity_id)?;
    }

    let card = state
        .cards
        .get_mut(&p.card_id)
        .ok_or_else(|| MutationError::state_corrupted(format!("card {} vanished", p.card_id)))?;
    card.position = position;
    if let Some(step_id) = p.step_id {
        card.step_id = step_id;
    }
    Ok(())
}

fn link_context_artifact(p: &LinkContextArtifact, state: &mut PlanningState) -> HandlerResult {
    require_card(state, p.card_id)?;
    if !state.context_artifact_exists(&p.context_artifact_id) {
        return Err(not_found("context artifact", p.context_artifact_id));
    }
    state
        .card_context_links
        .entry(p.card_id)
        .or_default()
        .insert(p.context_artifact_id);
    Ok(())
}

// ---------------------------------------------------------------------------
// Planned files
// ---------------------------------------------------------------------------

fn upsert_planned_file(id: Uuid, p: &UpsertPlannedFile, state: &mut PlanningState) -> HandlerResult {
    require_card(state, p.card_id)?;

    let owner = state
        .card_planned_files
        .iter()
        .find(|(_, files)| files.iter().any(|f| f.id == id))
        .map(|(card_id, _)| *card_id);
    if let Some(owner) = owner.filter(|owner| *owner != p.card_id) {
        return Err(MutationError::constraint_violation(format!(
            "planned file {id} belongs to card {owner}"
        )));
    }
    if owner.is_none() {
        ensure_fresh(state, id)?;
    }

    let files = state.card_planned_files.entry(p.card_id).or_default();
    match files.iter_mut().find(|f| f.id == id) {
        Some(file) => {
            file.logical_file_name = p.logical_file_name.clone();
            file.module_hint = p.module_hint.clone();
            file.artifact_kind = p.artifact_kind;
            file.action = p.action;
            file.intent_summary = p.intent_summary.clone();
            file.contract_notes = p.contract_notes.clone();
            file.status = if p.source == Some(KnowledgeSource::User) {
                PlannedFileStatus::UserEdited
            } else {
                PlannedFileStatus::Proposed
            };
            if let Some(position) = p.position {
                file.position = non_negative("position", position)?;
            }
        }
        None => {
            let position = position_or_append(p.position, files.iter().map(|f| f.position))?;
            files.push(PlannedFile {
                id,
                card_id: p.card_id,
                logical_file_name: p.logical_file_name.clone(),
                module_hint: p.module_hint.clone(),
                artifact_kind: p.artifact_kind,
                action: p.action,
                intent_summary: p.intent_summary.clone(),
                contract_notes: p.contract_notes.clone(),
                status: PlannedFileStatus::Proposed,
                position,
            });
        }
    }
    files.sort_by_key(|f| f.position);
    Ok(())
}

fn approve_planned_file(p: &ApprovePlannedFile, state: &mut PlanningState) -> HandlerResult {
    require_card(state, p.card_id)?;
    let file = state
        .card_planned_files
        .get_mut(&p.card_id)
        .and_then(|files| files.iter_mut().find(|f| f.id == p.planned_file_id))
        .ok_or_else(|| not_found("planned file", p.planned_file_id))?;
    file.status = p.status;
    Ok(())
}

// ---------------------------------------------------------------------------
// Knowledge items
// ---------------------------------------------------------------------------

fn upsert_knowledge_item(
    id: Uuid,
    p: &UpsertCardKnowledgeItem,
    state: &mut PlanningState,
) -> HandlerResult {
    require_card(state, p.card_id)?;

    match state.knowledge_item_owner(&id) {
        Some((kind, card_id)) if kind != p.item_type || card_id != p.card_id => {
            return Err(MutationError::constraint_violation(format!(
                "{kind} {id} belongs to card {card_id}"
            ))
            .with_details(json!({ "id": id, "item_type": kind, "card_id": card_id })));
        }
        Some(_) => {}
        None => ensure_fresh(state, id)?,
    }

    let items = state
        .knowledge_items_mut(p.item_type)
        .entry(p.card_id)
        .or_default();
    match items.iter_mut().find(|i| i.id == id) {
        Some(item) => {
            item.text = p.text.clone();
            item.evidence_source = p.evidence_source.clone();
            item.confidence = p.confidence;
            if let Some(source) = p.source {
                item.source = source;
            }
            if let Some(position) = p.position {
                item.position = non_negative("position", position)?;
            }
        }
        None => {
            let position = position_or_append(p.position, items.iter().map(|i| i.position))?;
            items.push(KnowledgeItem {
                id,
                card_id: p.card_id,
                item_type: p.item_type,
                text: p.text.clone(),
                evidence_source: p.evidence_source.clone(),
                confidence: p.confidence,
                status: KnowledgeStatus::Draft,
                source: p.source.unwrap_or(KnowledgeSource::Agent),
                position,
            });
        }
    }
    items.sort_by_key(|i| i.position);
    Ok(())
}

fn set_knowledge_status(p: &SetCardKnowledgeStatus, state: &mut PlanningState) -> HandlerResult {
    require_card(state, p.card_id)?;
    let item = state
        .knowledge_items_mut(p.item_type)
        .get_mut(&p.card_id)
        .and_then(|items| items.iter_mut().find(|i| i.id == p.knowledge_item_id))
        .ok_or_else(|| not_found(p.item_type.as_str(), p.knowledge_item_id))?;
    item.status = p.status;
    Ok(())
}
