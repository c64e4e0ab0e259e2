//! Action validation: schema, referential integrity, and policy.
//!
//! ```text
//! RawAction --schema--> PlanningAction --references--> errors
//!                                      \--policy------> errors
//! ```
//!
//! A schema failure short-circuits: without a well-formed action there is
//! nothing meaningful to resolve, so the referential and policy stages are
//! skipped. The later two stages accumulate every violation they find.
//! Errors are values, never panics or `Err`s; callers decide what to do
//! with them.

pub mod policy;
pub mod referential;
pub mod schema;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::{PlanningAction, RawAction};
use crate::mutate::apply_action;
use crate::state::PlanningState;

pub use policy::validate_policy;
pub use referential::validate_references;
pub use schema::validate_schema;

/// Machine-readable category of a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorCode {
    InvalidSchema,
    ReferentialIntegrity,
    CodeGenerationDetected,
    DuplicateEntry,
    OrderingConflict,
}

impl ValidationErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidSchema => "invalid_schema",
            Self::ReferentialIntegrity => "referential_integrity",
            Self::CodeGenerationDetected => "code_generation_detected",
            Self::DuplicateEntry => "duplicate_entry",
            Self::OrderingConflict => "ordering_conflict",
        }
    }
}

impl fmt::Display for ValidationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reason an action must not be applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ValidationErrorCode,
    pub message: String,
    /// Dotted path of the offending field, e.g. `payload.title`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Position of the action within a batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_index: Option<usize>,
}

impl ValidationError {
    pub fn new(code: ValidationErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            action_index: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.action_index = Some(index);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(index) = self.action_index {
            write!(f, "action {index}: ")?;
        }
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(field) = &self.field {
            write!(f, " ({field})")?;
        }
        Ok(())
    }
}

/// Outcome of validating one action.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// The typed action, present whenever the schema stage passed.
    pub action: Option<PlanningAction>,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.action.is_some()
    }

    /// The typed action, only if every stage passed.
    pub fn into_valid_action(self) -> Option<PlanningAction> {
        if self.errors.is_empty() { self.action } else { None }
    }
}

/// Run all three stages against `state`.
pub fn validate_action(raw: &RawAction, state: &PlanningState) -> ValidationResult {
    let action = match validate_schema(raw) {
        Ok(action) => action,
        Err(errors) => {
            return ValidationResult {
                action: None,
                errors,
            };
        }
    };

    let mut errors = validate_references(&action, state);
    errors.extend(validate_policy(raw));

    ValidationResult {
        action: Some(action),
        errors,
    }
}

/// Outcome of validating an ordered list of actions.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchValidation {
    /// Whether the whole submission is acceptable.
    pub valid: bool,
    /// Every error, each tagged with the index of its action.
    pub errors: Vec<ValidationError>,
    /// Per-action results, in input order. Shorter than the input when
    /// validation stopped early.
    pub per_action: Vec<ValidationResult>,
}

impl BatchValidation {
    /// The typed actions, if every one of them validated.
    pub fn valid_actions(&self) -> Option<Vec<PlanningAction>> {
        if !self.valid {
            return None;
        }
        self.per_action.iter().map(|r| r.action.clone()).collect()
    }
}

/// Validate actions in order.
///
/// Each action is checked against a working copy of `state` into which
/// every earlier valid action has been applied, so an action may refer to
/// an entity created earlier in the same batch. `state` itself is never
/// modified. With `stop_on_error`, validation ends after the first action
/// that has errors.
pub fn validate_action_batch(
    actions: &[RawAction],
    state: &PlanningState,
    stop_on_error: bool,
) -> BatchValidation {
    let mut working = state.clone();
    let mut errors = Vec::new();
    let mut per_action = Vec::with_capacity(actions.len());

    for (index, raw) in actions.iter().enumerate() {
        let mut result = validate_action(raw, &working);
        for e in &mut result.errors {
            e.action_index = Some(index);
        }

        let failed = !result.errors.is_empty();
        if !failed {
            if let Some(action) = &result.action {
                if let Ok(next) = apply_action(action, &working) {
                    working = next;
                }
            }
        }

        errors.extend(result.errors.iter().cloned());
        per_action.push(result);

        if failed && stop_on_error {
            break;
        }
    }

    BatchValidation {
        valid: errors.is_empty(),
        errors,
        per_action,
    }
}
