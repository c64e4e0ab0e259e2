//! Schema stage: turn a [`RawAction`] into a typed [`PlanningAction`].
//!
//! Checks the envelope, then reads the kind-specific fields out of
//! `target_ref` and `payload`, collecting one error per bad field.

use std::str::FromStr;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::{ValidationError, ValidationErrorCode};
use crate::action::{
    ActionKind, ActionType, ApprovePlannedFile, CreateActivity, CreateCard, CreateStep,
    CreateWorkflow, LinkContextArtifact, PlanningAction, RawAction, ReorderCard,
    SetCardKnowledgeStatus, UpdateCard, UpdateProject, UpsertCardKnowledgeItem, UpsertPlannedFile,
};
use storymap_db::models::PlannedFileStatus;

/// Validate the shape of `raw` and build the typed action.
pub fn validate_schema(raw: &RawAction) -> Result<PlanningAction, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let id = parse_envelope_uuid(&raw.id, "id", &mut errors);
    let project_id = parse_envelope_uuid(&raw.project_id, "project_id", &mut errors);

    let action_type = match raw.action_type.parse::<ActionType>() {
        Ok(t) => Some(t),
        Err(_) => {
            errors.push(
                invalid(format!("unknown action_type {:?}", raw.action_type))
                    .with_field("action_type"),
            );
            None
        }
    };

    let empty = Map::new();
    let target = section(&raw.target_ref, "target_ref", &mut errors).unwrap_or(&empty);
    let payload = section(&raw.payload, "payload", &mut errors).unwrap_or(&empty);

    let Some(action_type) = action_type else {
        return Err(errors);
    };

    let mut fields = Fields {
        target,
        payload,
        errors,
    };
    let kind = fields.read_kind(action_type);

    match (id, project_id, kind) {
        (Some(id), Some(project_id), Some(kind)) if fields.errors.is_empty() => {
            Ok(PlanningAction {
                id,
                project_id,
                kind,
            })
        }
        _ => Err(fields.errors),
    }
}

fn invalid(message: impl Into<String>) -> ValidationError {
    ValidationError::new(ValidationErrorCode::InvalidSchema, message)
}

fn parse_envelope_uuid(raw: &str, field: &str, errors: &mut Vec<ValidationError>) -> Option<Uuid> {
    match Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            errors.push(invalid(format!("{field} must be a UUID, got {raw:?}")).with_field(field));
            None
        }
    }
}

fn section<'a>(
    value: &'a Value,
    name: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<&'a Map<String, Value>> {
    match value {
        Value::Object(obj) => Some(obj),
        Value::Null => None,
        _ => {
            errors.push(invalid(format!("{name} must be an object")).with_field(name));
            None
        }
    }
}

#[derive(Clone, Copy)]
enum Sec {
    Target,
    Payload,
}

impl Sec {
    fn name(self) -> &'static str {
        match self {
            Self::Target => "target_ref",
            Self::Payload => "payload",
        }
    }
}

/// Field reader over the two argument sections of one action.
struct Fields<'a> {
    target: &'a Map<String, Value>,
    payload: &'a Map<String, Value>,
    errors: Vec<ValidationError>,
}

impl Fields<'_> {
    fn get(&self, sec: Sec, key: &str) -> Option<&Value> {
        let map = match sec {
            Sec::Target => self.target,
            Sec::Payload => self.payload,
        };
        map.get(key).filter(|v| !v.is_null())
    }

    fn fail(&mut self, sec: Sec, key: &str, message: String) {
        self.errors
            .push(invalid(message).with_field(format!("{}.{key}", sec.name())));
    }

    fn required_uuid(&mut self, sec: Sec, key: &str) -> Option<Uuid> {
        if self.get(sec, key).is_none() {
            self.fail(sec, key, format!("{key} is required"));
            return None;
        }
        self.optional_uuid(sec, key)
    }

    fn optional_uuid(&mut self, sec: Sec, key: &str) -> Option<Uuid> {
        let value = self.get(sec, key)?;
        match value.as_str().map(Uuid::parse_str) {
            Some(Ok(id)) => Some(id),
            _ => {
                let shown = value.to_string();
                self.fail(sec, key, format!("{key} must be a UUID, got {shown}"));
                None
            }
        }
    }

    /// Missing -> `None`, explicit null -> `Some(None)`.
    fn nullable_uuid(&mut self, sec: Sec, key: &str) -> Option<Option<Uuid>> {
        let map = match sec {
            Sec::Target => self.target,
            Sec::Payload => self.payload,
        };
        match map.get(key) {
            None => None,
            Some(Value::Null) => Some(None),
            Some(_) => self.optional_uuid(sec, key).map(Some),
        }
    }

    fn required_text(&mut self, sec: Sec, key: &str) -> Option<String> {
        match self.get(sec, key) {
            None => {
                self.fail(sec, key, format!("{key} is required"));
                None
            }
            Some(_) => self.nonempty_text(sec, key),
        }
    }

    /// Optional, but must not be blank when given.
    fn nonempty_text(&mut self, sec: Sec, key: &str) -> Option<String> {
        let text = self.optional_text(sec, key)?;
        if text.trim().is_empty() {
            self.fail(sec, key, format!("{key} must not be empty"));
            return None;
        }
        Some(text)
    }

    fn optional_text(&mut self, sec: Sec, key: &str) -> Option<String> {
        let value = self.get(sec, key)?;
        match value.as_str() {
            Some(s) => Some(s.to_owned()),
            None => {
                self.fail(sec, key, format!("{key} must be a string"));
                None
            }
        }
    }

    fn optional_int(&mut self, sec: Sec, key: &str, min: i32) -> Option<i32> {
        let value = self.get(sec, key)?;
        match value.as_i64().and_then(|n| i32::try_from(n).ok()) {
            Some(n) if n >= min => Some(n),
            Some(n) => {
                self.fail(sec, key, format!("{key} must be >= {min}, got {n}"));
                None
            }
            None => {
                self.fail(sec, key, format!("{key} must be an integer"));
                None
            }
        }
    }

    fn required_int(&mut self, sec: Sec, key: &str, min: i32) -> Option<i32> {
        if self.get(sec, key).is_none() {
            self.fail(sec, key, format!("{key} is required"));
            return None;
        }
        self.optional_int(sec, key, min)
    }

    fn optional_fraction(&mut self, sec: Sec, key: &str) -> Option<f64> {
        let value = self.get(sec, key)?;
        match value.as_f64() {
            Some(n) if (0.0..=1.0).contains(&n) => Some(n),
            _ => {
                self.fail(sec, key, format!("{key} must be a number between 0 and 1"));
                None
            }
        }
    }

    fn optional_enum<T: FromStr>(&mut self, sec: Sec, key: &str) -> Option<T>
    where
        T::Err: std::fmt::Display,
    {
        let value = self.get(sec, key)?;
        let Some(text) = value.as_str() else {
            self.fail(sec, key, format!("{key} must be a string"));
            return None;
        };
        match text.parse::<T>() {
            Ok(v) => Some(v),
            Err(e) => {
                self.fail(sec, key, e.to_string());
                None
            }
        }
    }

    fn required_enum<T: FromStr>(&mut self, sec: Sec, key: &str) -> Option<T>
    where
        T::Err: std::fmt::Display,
    {
        if self.get(sec, key).is_none() {
            self.fail(sec, key, format!("{key} is required"));
            return None;
        }
        self.optional_enum(sec, key)
    }

    fn read_kind(&mut self, action_type: ActionType) -> Option<ActionKind> {
        use Sec::{Payload as P, Target as T};

        match action_type {
            ActionType::UpdateProject => {
                let project_id = self.required_uuid(T, "project_id");
                let update = UpdateProject {
                    project_id: project_id.unwrap_or_default(),
                    name: self.nonempty_text(P, "name"),
                    description: self.optional_text(P, "description"),
                    tech_stack: self.optional_text(P, "tech_stack"),
                    deployment: self.optional_text(P, "deployment"),
                    design_inspiration: self.optional_text(P, "design_inspiration"),
                    repo_url: self.optional_text(P, "repo_url"),
                    default_branch: self.nonempty_text(P, "default_branch"),
                };
                let UpdateProject {
                    name,
                    description,
                    tech_stack,
                    deployment,
                    design_inspiration,
                    repo_url,
                    default_branch,
                    ..
                } = &update;
                let touches_anything = name.is_some()
                    || description.is_some()
                    || tech_stack.is_some()
                    || deployment.is_some()
                    || design_inspiration.is_some()
                    || repo_url.is_some()
                    || default_branch.is_some();
                if !touches_anything && self.errors.is_empty() {
                    self.errors.push(
                        invalid("updateProject payload must change at least one field")
                            .with_field("payload"),
                    );
                }
                project_id.map(|_| ActionKind::UpdateProject(update))
            }
            ActionType::CreateWorkflow => {
                let project_id = self.required_uuid(T, "project_id");
                let id = self.optional_uuid(P, "id");
                let title = self.required_text(P, "title");
                let description = self.optional_text(P, "description");
                let position = self.optional_int(P, "position", 0);
                match (project_id, title) {
                    (Some(project_id), Some(title)) => Some(ActionKind::CreateWorkflow(CreateWorkflow {
                        project_id,
                        id,
                        title,
                        description,
                        position,
                    })),
                    _ => None,
                }
            }
            ActionType::CreateActivity => {
                let workflow_id = self.required_uuid(T, "workflow_id");
                let id = self.optional_uuid(P, "id");
                let title = self.required_text(P, "title");
                let color = self.optional_text(P, "color");
                let position = self.optional_int(P, "position", 0);
                match (workflow_id, title) {
                    (Some(workflow_id), Some(title)) => Some(ActionKind::CreateActivity(CreateActivity {
                        workflow_id,
                        id,
                        title,
                        color,
                        position,
                    })),
                    _ => None,
                }
            }
            ActionType::CreateStep => {
                let activity_id = self.required_uuid(T, "workflow_activity_id");
                let id = self.optional_uuid(P, "id");
                let title = self.required_text(P, "title");
                let position = self.optional_int(P, "position", 0);
                match (activity_id, title) {
                    (Some(workflow_activity_id), Some(title)) => Some(ActionKind::CreateStep(CreateStep {
                        workflow_activity_id,
                        id,
                        title,
                        position,
                    })),
                    _ => None,
                }
            }
            ActionType::CreateCard => {
                let activity_id = self.required_uuid(T, "workflow_activity_id");
                let step_id = self.optional_uuid(T, "step_id");
                let id = self.optional_uuid(P, "id");
                let title = self.required_text(P, "title");
                let description = self.optional_text(P, "description");
                let status = self.optional_enum(P, "status");
                let priority = self.optional_int(P, "priority", 0);
                let position = self.optional_int(P, "position", 0);
                match (activity_id, title) {
                    (Some(workflow_activity_id), Some(title)) => Some(ActionKind::CreateCard(CreateCard {
                        workflow_activity_id,
                        step_id,
                        id,
                        title,
                        description,
                        status,
                        priority,
                        position,
                    })),
                    _ => None,
                }
            }
            ActionType::UpdateCard => {
                let card_id = self.required_uuid(T, "card_id");
                let title = self.nonempty_text(P, "title");
                let description = self.optional_text(P, "description");
                let status = self.optional_enum(P, "status");
                let priority = self.optional_int(P, "priority", 0);
                let touches_anything = title.is_some()
                    || description.is_some()
                    || status.is_some()
                    || priority.is_some();
                if !touches_anything && self.errors.is_empty() {
                    self.errors.push(
                        invalid("updateCard payload must change at least one field")
                            .with_field("payload"),
                    );
                }
                card_id.map(|card_id| {
                    ActionKind::UpdateCard(UpdateCard {
                        card_id,
                        title,
                        description,
                        status,
                        priority,
                    })
                })
            }
            ActionType::ReorderCard => {
                let card_id = self.required_uuid(T, "card_id");
                let new_position = self.required_int(P, "new_position", 0);
                let step_id = self.nullable_uuid(P, "step_id");
                match (card_id, new_position) {
                    (Some(card_id), Some(new_position)) => Some(ActionKind::ReorderCard(ReorderCard {
                        card_id,
                        new_position,
                        step_id,
                    })),
                    _ => None,
                }
            }
            ActionType::LinkContextArtifact => {
                let card_id = self.required_uuid(T, "card_id");
                let artifact_id = self.required_uuid(P, "context_artifact_id");
                let usage_hint = self.optional_text(P, "usage_hint");
                match (card_id, artifact_id) {
                    (Some(card_id), Some(context_artifact_id)) => {
                        Some(ActionKind::LinkContextArtifact(LinkContextArtifact {
                            card_id,
                            context_artifact_id,
                            usage_hint,
                        }))
                    }
                    _ => None,
                }
            }
            ActionType::UpsertPlannedFile => {
                let card_id = self.required_uuid(T, "card_id");
                let planned_file_id = self.optional_uuid(P, "planned_file_id");
                let logical_file_name = self.required_text(P, "logical_file_name");
                let module_hint = self.optional_text(P, "module_hint");
                let artifact_kind = self.required_enum(P, "artifact_kind");
                let action = self.required_enum(P, "action");
                let intent_summary = self.required_text(P, "intent_summary");
                let contract_notes = self.optional_text(P, "contract_notes");
                let source = self.optional_enum(P, "source");
                let position = self.optional_int(P, "position", 0);
                match (card_id, logical_file_name, artifact_kind, action, intent_summary) {
                    (
                        Some(card_id),
                        Some(logical_file_name),
                        Some(artifact_kind),
                        Some(action),
                        Some(intent_summary),
                    ) => Some(ActionKind::UpsertPlannedFile(UpsertPlannedFile {
                        card_id,
                        planned_file_id,
                        logical_file_name,
                        module_hint,
                        artifact_kind,
                        action,
                        intent_summary,
                        contract_notes,
                        source,
                        position,
                    })),
                    _ => None,
                }
            }
            ActionType::ApprovePlannedFile => {
                let card_id = self.required_uuid(T, "card_id");
                let planned_file_id = self.required_uuid(T, "planned_file_id");
                // user_edited only comes from a user re-upserting the file.
                let status = match self.optional_enum(P, "status") {
                    Some(PlannedFileStatus::UserEdited) => {
                        self.fail(P, "status", "status must be approved or proposed".to_owned());
                        None
                    }
                    other => Some(other.unwrap_or(PlannedFileStatus::Approved)),
                };
                match (card_id, planned_file_id, status) {
                    (Some(card_id), Some(planned_file_id), Some(status)) => {
                        Some(ActionKind::ApprovePlannedFile(ApprovePlannedFile {
                            card_id,
                            planned_file_id,
                            status,
                        }))
                    }
                    _ => None,
                }
            }
            ActionType::UpsertCardKnowledgeItem => {
                let card_id = self.required_uuid(T, "card_id");
                let item_type = self.required_enum(P, "item_type");
                let knowledge_item_id = self.optional_uuid(P, "knowledge_item_id");
                let text = self.required_text(P, "text");
                let evidence_source = self.optional_text(P, "evidence_source");
                let confidence = self.optional_fraction(P, "confidence");
                let source = self.optional_enum(P, "source");
                let position = self.optional_int(P, "position", 0);
                match (card_id, item_type, text) {
                    (Some(card_id), Some(item_type), Some(text)) => {
                        Some(ActionKind::UpsertCardKnowledgeItem(UpsertCardKnowledgeItem {
                            card_id,
                            item_type,
                            knowledge_item_id,
                            text,
                            evidence_source,
                            confidence,
                            source,
                            position,
                        }))
                    }
                    _ => None,
                }
            }
            ActionType::SetCardKnowledgeStatus => {
                let card_id = self.required_uuid(T, "card_id");
                let knowledge_item_id = self.required_uuid(T, "knowledge_item_id");
                let item_type = self.required_enum(P, "item_type");
                let status = self.required_enum(P, "status");
                match (card_id, knowledge_item_id, item_type, status) {
                    (Some(card_id), Some(knowledge_item_id), Some(item_type), Some(status)) => {
                        Some(ActionKind::SetCardKnowledgeStatus(SetCardKnowledgeStatus {
                            card_id,
                            item_type,
                            knowledge_item_id,
                            status,
                        }))
                    }
                    _ => None,
                }
            }
        }
    }
}
