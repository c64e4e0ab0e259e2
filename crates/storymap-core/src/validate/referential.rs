//! Referential stage: every id an action mentions must resolve in the
//! project graph it is validated against.

use uuid::Uuid;

use super::{ValidationError, ValidationErrorCode};
use crate::action::{ActionKind, PlanningAction};
use crate::state::PlanningState;

/// Check every reference of `action` against `state`.
///
/// All violations are reported; the check never stops at the first.
pub fn validate_references(action: &PlanningAction, state: &PlanningState) -> Vec<ValidationError> {
    let mut check = Check {
        state,
        errors: Vec::new(),
    };

    if action.project_id != state.project.id {
        check.missing("project_id", "project", action.project_id);
    }

    match &action.kind {
        ActionKind::UpdateProject(p) => {
            if p.project_id != state.project.id {
                check.missing("target_ref.project_id", "project", p.project_id);
            }
        }
        ActionKind::CreateWorkflow(p) => {
            if p.project_id != state.project.id {
                check.missing("target_ref.project_id", "project", p.project_id);
            }
            check.fresh("payload.id", p.id);
        }
        ActionKind::CreateActivity(p) => {
            check.workflow("target_ref.workflow_id", p.workflow_id);
            check.fresh("payload.id", p.id);
        }
        ActionKind::CreateStep(p) => {
            check.activity("target_ref.workflow_activity_id", p.workflow_activity_id);
            check.fresh("payload.id", p.id);
        }
        ActionKind::CreateCard(p) => {
            let activity_ok =
                check.activity("target_ref.workflow_activity_id", p.workflow_activity_id);
            if let Some(step_id) = p.step_id {
                if check.step("target_ref.step_id", step_id) && activity_ok {
                    check.step_under(step_id, p.workflow_activity_id, "target_ref.step_id");
                }
            }
            check.fresh("payload.id", p.id);
        }
        ActionKind::UpdateCard(p) => {
            check.card("target_ref.card_id", p.card_id);
        }
        ActionKind::ReorderCard(p) => {
            let card_ok = check.card("target_ref.card_id", p.card_id);
            if let Some(Some(step_id)) = p.step_id {
                if check.step("payload.step_id", step_id) && card_ok {
                    let activity_id = state.cards[&p.card_id].activity_id;
                    check.step_under(step_id, activity_id, "payload.step_id");
                }
            }
        }
        ActionKind::LinkContextArtifact(p) => {
            check.card("target_ref.card_id", p.card_id);
            let in_project = state
                .context_artifacts
                .get(&p.context_artifact_id)
                .is_some_and(|a| a.project_id == state.project.id);
            if !in_project {
                check.missing(
                    "payload.context_artifact_id",
                    "context artifact",
                    p.context_artifact_id,
                );
            }
        }
        ActionKind::UpsertPlannedFile(p) => {
            check.card("target_ref.card_id", p.card_id);
        }
        ActionKind::ApprovePlannedFile(p) => {
            if check.card("target_ref.card_id", p.card_id)
                && state.find_planned_file(&p.card_id, &p.planned_file_id).is_none()
            {
                check.missing("target_ref.planned_file_id", "planned file", p.planned_file_id);
            }
        }
        ActionKind::UpsertCardKnowledgeItem(p) => {
            check.card("target_ref.card_id", p.card_id);
            if let Some(id) = p.knowledge_item_id {
                match state.knowledge_item_owner(&id) {
                    Some((kind, card_id)) if kind != p.item_type || card_id != p.card_id => {
                        check.errors.push(
                            ValidationError::new(
                                ValidationErrorCode::DuplicateEntry,
                                format!("{kind} {id} already exists on card {card_id}"),
                            )
                            .with_field("payload.knowledge_item_id"),
                        );
                    }
                    Some(_) => {}
                    None => check.fresh("payload.knowledge_item_id", Some(id)),
                }
            }
        }
        ActionKind::SetCardKnowledgeStatus(p) => {
            if check.card("target_ref.card_id", p.card_id)
                && state
                    .find_knowledge_item(p.item_type, &p.card_id, &p.knowledge_item_id)
                    .is_none()
            {
                check.missing(
                    "target_ref.knowledge_item_id",
                    p.item_type.as_str(),
                    p.knowledge_item_id,
                );
            }
        }
    }

    check.errors
}

struct Check<'a> {
    state: &'a PlanningState,
    errors: Vec<ValidationError>,
}

impl Check<'_> {
    fn missing(&mut self, field: &str, entity: &str, id: Uuid) {
        self.errors.push(
            ValidationError::new(
                ValidationErrorCode::ReferentialIntegrity,
                format!("{entity} {id} does not exist in project {}", self.state.project.id),
            )
            .with_field(field),
        );
    }

    fn require(&mut self, exists: bool, field: &str, entity: &str, id: Uuid) -> bool {
        if !exists {
            self.missing(field, entity, id);
        }
        exists
    }

    fn workflow(&mut self, field: &str, id: Uuid) -> bool {
        let exists = self.state.workflow_exists(&id);
        self.require(exists, field, "workflow", id)
    }

    fn activity(&mut self, field: &str, id: Uuid) -> bool {
        let exists = self.state.activity_exists(&id);
        self.require(exists, field, "activity", id)
    }

    fn step(&mut self, field: &str, id: Uuid) -> bool {
        let exists = self.state.step_exists(&id);
        self.require(exists, field, "step", id)
    }

    fn card(&mut self, field: &str, id: Uuid) -> bool {
        let exists = self.state.card_exists(&id);
        self.require(exists, field, "card", id)
    }

    /// A card may only sit in a step of its own activity.
    fn step_under(&mut self, step_id: Uuid, activity_id: Uuid, field: &str) {
        let owner = self.state.steps[&step_id].activity_id;
        if owner != activity_id {
            self.errors.push(
                ValidationError::new(
                    ValidationErrorCode::OrderingConflict,
                    format!("step {step_id} belongs to activity {owner}, not {activity_id}"),
                )
                .with_field(field),
            );
        }
    }

    /// An explicit create id must not collide with an existing entity.
    fn fresh(&mut self, field: &str, id: Option<Uuid>) {
        if let Some(id) = id {
            if self.state.id_in_use(&id) {
                self.errors.push(
                    ValidationError::new(
                        ValidationErrorCode::DuplicateEntry,
                        format!("id {id} is already in use"),
                    )
                    .with_field(field),
                );
            }
        }
    }
}
