//! Planning actions: the wire envelope produced by a model and the typed,
//! closed set of action kinds the engine understands.
//!
//! ```text
//! LLM text --stream--> RawAction --normalize--> RawAction --schema--> PlanningAction
//! ```
//!
//! [`RawAction`] is deliberately loose (strings and JSON values) so that a
//! malformed action can still be carried, reported and audited.
//! [`PlanningAction`] only exists once the schema stage of the validator
//! has accepted the envelope and payload.

pub mod normalize;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use storymap_db::models::{
    CardStatus, KnowledgeItemType, KnowledgeSource, KnowledgeStatus, PlannedFileAction,
    PlannedFileKind, PlannedFileStatus,
};

pub use normalize::{IdRemap, Normalizer, canonical_action_type, normalize_actions};

// ---------------------------------------------------------------------------
// Action type names
// ---------------------------------------------------------------------------

/// Wire names of the twelve supported actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    UpdateProject,
    CreateWorkflow,
    CreateActivity,
    CreateStep,
    CreateCard,
    UpdateCard,
    ReorderCard,
    LinkContextArtifact,
    UpsertPlannedFile,
    ApprovePlannedFile,
    UpsertCardKnowledgeItem,
    SetCardKnowledgeStatus,
}

impl ActionType {
    pub const ALL: &'static [ActionType] = &[
        Self::UpdateProject,
        Self::CreateWorkflow,
        Self::CreateActivity,
        Self::CreateStep,
        Self::CreateCard,
        Self::UpdateCard,
        Self::ReorderCard,
        Self::LinkContextArtifact,
        Self::UpsertPlannedFile,
        Self::ApprovePlannedFile,
        Self::UpsertCardKnowledgeItem,
        Self::SetCardKnowledgeStatus,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpdateProject => "updateProject",
            Self::CreateWorkflow => "createWorkflow",
            Self::CreateActivity => "createActivity",
            Self::CreateStep => "createStep",
            Self::CreateCard => "createCard",
            Self::UpdateCard => "updateCard",
            Self::ReorderCard => "reorderCard",
            Self::LinkContextArtifact => "linkContextArtifact",
            Self::UpsertPlannedFile => "upsertPlannedFile",
            Self::ApprovePlannedFile => "approvePlannedFile",
            Self::UpsertCardKnowledgeItem => "upsertCardKnowledgeItem",
            Self::SetCardKnowledgeStatus => "setCardKnowledgeStatus",
        }
    }

    /// The payload key that names the entity this action creates, if any.
    pub fn created_id_key(self) -> Option<&'static str> {
        match self {
            Self::CreateWorkflow | Self::CreateActivity | Self::CreateStep | Self::CreateCard => {
                Some("id")
            }
            Self::UpsertPlannedFile => Some("planned_file_id"),
            Self::UpsertCardKnowledgeItem => Some("knowledge_item_id"),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ActionTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ActionTypeParseError(s.to_owned()))
    }
}

/// Error returned when parsing an unknown action type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action type: {0:?}")]
pub struct ActionTypeParseError(pub String);

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// An action exactly as an upstream producer sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, alias = "projectId", deserialize_with = "lenient_string")]
    pub project_id: String,
    #[serde(default, alias = "actionType", deserialize_with = "lenient_string")]
    pub action_type: String,
    #[serde(default = "empty_object", alias = "targetRef")]
    pub target_ref: Value,
    #[serde(default = "empty_object")]
    pub payload: Value,
}

impl RawAction {
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<String>,
        action_type: impl Into<String>,
        target_ref: Value,
        payload: Value,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            action_type: action_type.into(),
            target_ref,
            payload,
        }
    }

    /// Parse a raw action out of an arbitrary JSON value.
    ///
    /// Returns `None` for values that are not objects.
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    pub fn target_ref_object(&self) -> Option<&Map<String, Value>> {
        self.target_ref.as_object()
    }

    pub fn payload_object(&self) -> Option<&Map<String, Value>> {
        self.payload.as_object()
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Accept strings, numbers and null where a string id is expected.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Typed actions
// ---------------------------------------------------------------------------

/// A schema-valid planning action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanningAction {
    pub id: Uuid,
    pub project_id: Uuid,
    pub kind: ActionKind,
}

/// The closed set of supported actions, each with its typed arguments
/// (target reference and payload merged).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action_type", rename_all = "camelCase")]
pub enum ActionKind {
    UpdateProject(UpdateProject),
    CreateWorkflow(CreateWorkflow),
    CreateActivity(CreateActivity),
    CreateStep(CreateStep),
    CreateCard(CreateCard),
    UpdateCard(UpdateCard),
    ReorderCard(ReorderCard),
    LinkContextArtifact(LinkContextArtifact),
    UpsertPlannedFile(UpsertPlannedFile),
    ApprovePlannedFile(ApprovePlannedFile),
    UpsertCardKnowledgeItem(UpsertCardKnowledgeItem),
    SetCardKnowledgeStatus(SetCardKnowledgeStatus),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateProject {
    pub project_id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tech_stack: Option<String>,
    pub deployment: Option<String>,
    pub design_inspiration: Option<String>,
    pub repo_url: Option<String>,
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateWorkflow {
    pub project_id: Uuid,
    pub id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateActivity {
    pub workflow_id: Uuid,
    pub id: Option<Uuid>,
    pub title: String,
    pub color: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateStep {
    pub workflow_activity_id: Uuid,
    pub id: Option<Uuid>,
    pub title: String,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateCard {
    pub workflow_activity_id: Uuid,
    pub step_id: Option<Uuid>,
    pub id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<CardStatus>,
    pub priority: Option<i32>,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateCard {
    pub card_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<CardStatus>,
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReorderCard {
    pub card_id: Uuid,
    pub new_position: i32,
    /// `None` leaves the step unchanged, `Some(None)` detaches the card.
    pub step_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkContextArtifact {
    pub card_id: Uuid,
    pub context_artifact_id: Uuid,
    pub usage_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertPlannedFile {
    pub card_id: Uuid,
    pub planned_file_id: Option<Uuid>,
    pub logical_file_name: String,
    pub module_hint: Option<String>,
    pub artifact_kind: PlannedFileKind,
    pub action: PlannedFileAction,
    pub intent_summary: String,
    pub contract_notes: Option<String>,
    pub source: Option<KnowledgeSource>,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovePlannedFile {
    pub card_id: Uuid,
    pub planned_file_id: Uuid,
    pub status: PlannedFileStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertCardKnowledgeItem {
    pub card_id: Uuid,
    pub item_type: KnowledgeItemType,
    pub knowledge_item_id: Option<Uuid>,
    pub text: String,
    pub evidence_source: Option<String>,
    pub confidence: Option<f64>,
    pub source: Option<KnowledgeSource>,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetCardKnowledgeStatus {
    pub card_id: Uuid,
    pub item_type: KnowledgeItemType,
    pub knowledge_item_id: Uuid,
    pub status: KnowledgeStatus,
}

impl ActionKind {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::UpdateProject(_) => ActionType::UpdateProject,
            Self::CreateWorkflow(_) => ActionType::CreateWorkflow,
            Self::CreateActivity(_) => ActionType::CreateActivity,
            Self::CreateStep(_) => ActionType::CreateStep,
            Self::CreateCard(_) => ActionType::CreateCard,
            Self::UpdateCard(_) => ActionType::UpdateCard,
            Self::ReorderCard(_) => ActionType::ReorderCard,
            Self::LinkContextArtifact(_) => ActionType::LinkContextArtifact,
            Self::UpsertPlannedFile(_) => ActionType::UpsertPlannedFile,
            Self::ApprovePlannedFile(_) => ActionType::ApprovePlannedFile,
            Self::UpsertCardKnowledgeItem(_) => ActionType::UpsertCardKnowledgeItem,
            Self::SetCardKnowledgeStatus(_) => ActionType::SetCardKnowledgeStatus,
        }
    }
}

impl PlanningAction {
    pub fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }

    /// The id of the entity this action creates or changes.
    ///
    /// Creates and upserts that carry no explicit id get one derived from
    /// the action id, so applying or previewing the same action twice names
    /// the same entity.
    pub fn entity_id(&self) -> Uuid {
        match &self.kind {
            ActionKind::UpdateProject(p) => p.project_id,
            ActionKind::CreateWorkflow(p) => p.id.unwrap_or_else(|| self.derived_id()),
            ActionKind::CreateActivity(p) => p.id.unwrap_or_else(|| self.derived_id()),
            ActionKind::CreateStep(p) => p.id.unwrap_or_else(|| self.derived_id()),
            ActionKind::CreateCard(p) => p.id.unwrap_or_else(|| self.derived_id()),
            ActionKind::UpdateCard(p) => p.card_id,
            ActionKind::ReorderCard(p) => p.card_id,
            ActionKind::LinkContextArtifact(p) => p.card_id,
            ActionKind::UpsertPlannedFile(p) => {
                p.planned_file_id.unwrap_or_else(|| self.derived_id())
            }
            ActionKind::ApprovePlannedFile(p) => p.planned_file_id,
            ActionKind::UpsertCardKnowledgeItem(p) => {
                p.knowledge_item_id.unwrap_or_else(|| self.derived_id())
            }
            ActionKind::SetCardKnowledgeStatus(p) => p.knowledge_item_id,
        }
    }

    fn derived_id(&self) -> Uuid {
        Uuid::new_v5(&self.id, self.action_type().as_str().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_type_roundtrip() {
        for t in ActionType::ALL {
            assert_eq!(t.as_str().parse::<ActionType>().unwrap(), *t);
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, json!(t.as_str()));
        }
        assert_eq!(ActionType::ALL.len(), 12);
    }

    #[test]
    fn unknown_action_type_is_an_error() {
        let err = "deleteEverything".parse::<ActionType>().unwrap_err();
        assert!(err.to_string().contains("deleteEverything"));
    }

    #[test]
    fn raw_action_accepts_camel_case_and_numbers() {
        let raw: RawAction = serde_json::from_value(json!({
            "id": 7,
            "projectId": "p",
            "actionType": "createWorkflow",
            "targetRef": {"project_id": "p"},
        }))
        .unwrap();
        assert_eq!(raw.id, "7");
        assert_eq!(raw.project_id, "p");
        assert_eq!(raw.action_type, "createWorkflow");
        assert_eq!(raw.target_ref, json!({"project_id": "p"}));
        assert_eq!(raw.payload, json!({}));
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(RawAction::from_value(json!([1, 2])).is_none());
        assert!(RawAction::from_value(json!("createCard")).is_none());
    }

    #[test]
    fn derived_entity_id_is_stable() {
        let action = PlanningAction {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            kind: ActionKind::CreateWorkflow(CreateWorkflow {
                project_id: Uuid::new_v4(),
                id: None,
                title: "Browse".into(),
                description: None,
                position: None,
            }),
        };
        assert_eq!(action.entity_id(), action.entity_id());
        assert_ne!(action.entity_id(), action.id);
    }
}
