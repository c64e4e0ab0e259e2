//! Repair of model-produced actions before they are trusted.
//!
//! Models invent their own identifiers ("card-1", "wf_checkout") and keep
//! referring to them later in the same response. [`Normalizer`] swaps every
//! non-UUID id for a fresh UUID and records the substitution in an
//! [`IdRemap`], so later references to the original spelling are rewritten
//! to the same replacement. One normalizer is scoped to one stream or batch.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::{ActionType, RawAction};

/// Keys whose string values refer to other entities.
const REFERENCE_KEYS: &[&str] = &[
    "project_id",
    "workflow_id",
    "workflow_activity_id",
    "activity_id",
    "step_id",
    "card_id",
    "context_artifact_id",
    "planned_file_id",
    "knowledge_item_id",
];

/// Places a model may put a card's activity instead of
/// `target_ref.workflow_activity_id`, in lookup order.
const ACTIVITY_ALIASES: &[&str] = &[
    "workflow_activity_id",
    "activity_id",
    "workflowActivityId",
    "activityId",
];

/// Original (invalid) id -> replacement UUID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdRemap {
    map: HashMap<String, Uuid>,
}

impl IdRemap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, original: impl Into<String>, replacement: Uuid) {
        self.map.insert(original.into(), replacement);
    }

    pub fn resolve(&self, original: &str) -> Option<Uuid> {
        self.map.get(original).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Map loose spellings (`create_card`, `CreateCard`, `create-card`) onto a
/// known action type.
pub fn canonical_action_type(raw: &str) -> Option<ActionType> {
    if let Ok(t) = raw.parse::<ActionType>() {
        return Some(t);
    }
    let folded: String = raw
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect();
    ActionType::ALL
        .iter()
        .copied()
        .find(|t| t.as_str().to_lowercase() == folded)
}

fn is_uuid(s: &str) -> bool {
    Uuid::parse_str(s).is_ok()
}

/// Stateful repairer for the actions of one stream or batch.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    remap: IdRemap,
    default_project_id: Option<Uuid>,
}

impl Normalizer {
    pub fn new(default_project_id: Option<Uuid>) -> Self {
        Self {
            remap: IdRemap::new(),
            default_project_id,
        }
    }

    pub fn remap(&self) -> &IdRemap {
        &self.remap
    }

    /// Repair one action. Never fails: anything that cannot be repaired is
    /// left for schema validation to report.
    pub fn normalize(&mut self, mut action: RawAction) -> RawAction {
        if let Some(t) = canonical_action_type(action.action_type.trim()) {
            action.action_type = t.as_str().to_owned();
        }

        // Action ids are never referenced, so they stay out of the remap.
        if !is_uuid(&action.id) {
            let fresh = Uuid::new_v4();
            debug!(original = %action.id, replacement = %fresh, "replaced action id");
            action.id = fresh.to_string();
        }

        action.project_id = self.normalize_project_id(&action.project_id);

        if action.target_ref.is_null() {
            action.target_ref = Value::Object(Map::new());
        }
        if action.payload.is_null() {
            action.payload = Value::Object(Map::new());
        }

        let action_type = action.action_type.parse::<ActionType>().ok();
        if action_type == Some(ActionType::CreateCard) {
            repair_card_activity(&mut action);
        }

        self.rewrite_references(&mut action.target_ref);
        self.rewrite_references(&mut action.payload);

        if let Some(key) = action_type.and_then(ActionType::created_id_key) {
            self.assign_created_id(&mut action.payload, key);
        }

        action
    }

    fn normalize_project_id(&mut self, raw: &str) -> String {
        if is_uuid(raw) {
            return raw.to_owned();
        }
        if let Some(mapped) = self.remap.resolve(raw) {
            return mapped.to_string();
        }
        match self.default_project_id {
            Some(default) => {
                if !raw.is_empty() {
                    self.remap.insert(raw, default);
                }
                default.to_string()
            }
            None => raw.to_owned(),
        }
    }

    fn rewrite_references(&self, section: &mut Value) {
        let Some(obj) = section.as_object_mut() else {
            return;
        };
        for key in REFERENCE_KEYS {
            if let Some(Value::String(s)) = obj.get_mut(*key) {
                if let Some(mapped) = self.remap.resolve(s) {
                    *s = mapped.to_string();
                }
            }
        }
    }

    /// Give a create/upsert a valid id when the model supplied an invalid
    /// one. A missing id is left missing; the engine derives one.
    fn assign_created_id(&mut self, payload: &mut Value, key: &str) {
        let Some(obj) = payload.as_object_mut() else {
            return;
        };
        // Upserts sometimes use a plain "id".
        if key != "id" && !obj.contains_key(key) {
            if let Some(id) = obj.remove("id") {
                obj.insert(key.to_owned(), id);
            }
        }
        let Some(Value::String(original)) = obj.get(key) else {
            return;
        };
        if original.is_empty() || is_uuid(original) {
            return;
        }
        let original = original.clone();
        let fresh = Uuid::new_v4();
        debug!(%original, replacement = %fresh, key, "replaced created entity id");
        self.remap.insert(original, fresh);
        obj.insert(key.to_owned(), Value::String(fresh.to_string()));
    }
}

/// Move a card's activity reference into `target_ref.workflow_activity_id`
/// when the model put it somewhere else.
fn repair_card_activity(action: &mut RawAction) {
    let present = action
        .target_ref
        .get("workflow_activity_id")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    if present {
        return;
    }

    let found = [&action.target_ref, &action.payload]
        .into_iter()
        .flat_map(|section| ACTIVITY_ALIASES.iter().map(move |key| section.get(*key)))
        .flatten()
        .find_map(|v| v.as_str().filter(|s| !s.trim().is_empty()).map(str::to_owned));

    if let Some(activity) = found {
        if !action.target_ref.is_object() {
            action.target_ref = Value::Object(Map::new());
        }
        if let Some(obj) = action.target_ref.as_object_mut() {
            obj.insert("workflow_activity_id".into(), Value::String(activity));
        }
    }
}

/// Normalize a batch with a single shared remap.
pub fn normalize_actions(
    actions: impl IntoIterator<Item = RawAction>,
    default_project_id: Option<Uuid>,
) -> Vec<RawAction> {
    let mut normalizer = Normalizer::new(default_project_id);
    actions
        .into_iter()
        .map(|a| normalizer.normalize(a))
        .collect()
}
