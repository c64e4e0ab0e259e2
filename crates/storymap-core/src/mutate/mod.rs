//! The mutation engine: apply one typed action to a copy of a state.
//!
//! The engine trusts its input. Callers run the validator first; the checks
//! made here only keep the graph consistent when that did not happen.

mod handlers;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::action::PlanningAction;
use crate::state::PlanningState;

/// Why an action could not be applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    /// A handler panicked or found the graph inconsistent.
    #[error("state corrupted: {message}")]
    StateCorrupted {
        message: String,
        details: Option<Value>,
    },

    /// The action's target does not exist in the state.
    #[error("mutation failed: {message}")]
    MutationFailed {
        message: String,
        details: Option<Value>,
    },

    /// A value the graph cannot hold, such as a negative position.
    #[error("constraint violation: {message}")]
    ConstraintViolation {
        message: String,
        details: Option<Value>,
    },
}

impl MutationError {
    pub fn state_corrupted(message: impl Into<String>) -> Self {
        Self::StateCorrupted {
            message: message.into(),
            details: None,
        }
    }

    pub fn mutation_failed(message: impl Into<String>) -> Self {
        Self::MutationFailed {
            message: message.into(),
            details: None,
        }
    }

    pub fn constraint_violation(message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, value: Value) -> Self {
        match &mut self {
            Self::StateCorrupted { details, .. }
            | Self::MutationFailed { details, .. }
            | Self::ConstraintViolation { details, .. } => *details = Some(value),
        }
        self
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StateCorrupted { .. } => "state_corrupted",
            Self::MutationFailed { .. } => "mutation_failed",
            Self::ConstraintViolation { .. } => "constraint_violation",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::StateCorrupted { message, .. }
            | Self::MutationFailed { message, .. }
            | Self::ConstraintViolation { message, .. } => message,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::StateCorrupted { details, .. }
            | Self::MutationFailed { details, .. }
            | Self::ConstraintViolation { details, .. } => details.as_ref(),
        }
    }
}

/// `Ok` carries the new state; the input state is never touched.
pub type MutationResult = Result<PlanningState, MutationError>;

/// Apply `action` to a clone of `state` and return the clone.
///
/// A panic inside a handler is caught and reported as
/// [`MutationError::StateCorrupted`]; it never reaches the caller.
pub fn apply_action(action: &PlanningAction, state: &PlanningState) -> MutationResult {
    let mut next = state.clone();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_handler(action, &mut next)));

    match outcome {
        Ok(Ok(())) => Ok(next),
        Ok(Err(e)) => Err(e),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(
                action_id = %action.id,
                action_type = %action.action_type(),
                %message,
                "mutation handler panicked"
            );
            Err(MutationError::state_corrupted(message).with_details(serde_json::json!({
                "action_id": action.id,
                "action_type": action.action_type().as_str(),
            })))
        }
    }
}

#[cfg(test)]
thread_local! {
    /// Makes the next handler call on this thread panic.
    static PANIC_NEXT_HANDLER: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

fn run_handler(action: &PlanningAction, state: &mut PlanningState) -> Result<(), MutationError> {
    #[cfg(test)]
    if PANIC_NEXT_HANDLER.with(|flag| flag.replace(false)) {
        panic!("handler blew up on {}", action.action_type());
    }
    handlers::dispatch(action, state)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_messages() {
        let e = MutationError::mutation_failed("card x not found")
            .with_details(serde_json::json!({"card_id": "x"}));
        assert_eq!(e.code(), "mutation_failed");
        assert_eq!(e.message(), "card x not found");
        assert_eq!(e.to_string(), "mutation failed: card x not found");
        assert!(e.details().is_some());

        assert_eq!(MutationError::state_corrupted("x").code(), "state_corrupted");
        assert_eq!(
            MutationError::constraint_violation("x").code(),
            "constraint_violation"
        );
    }

    #[test]
    fn handler_panic_becomes_state_corrupted() {
        use crate::action::{ActionKind, UpdateProject};
        use storymap_db::models::Project;

        let state = PlanningState::empty(Project::new(uuid::Uuid::new_v4(), "Shop"));
        let action = PlanningAction {
            id: uuid::Uuid::new_v4(),
            project_id: state.project.id,
            kind: ActionKind::UpdateProject(UpdateProject {
                project_id: state.project.id,
                name: Some("Renamed".into()),
                ..UpdateProject::default()
            }),
        };

        PANIC_NEXT_HANDLER.with(|flag| flag.set(true));
        let err = apply_action(&action, &state).unwrap_err();
        assert_eq!(err.code(), "state_corrupted");
        assert_eq!(err.message(), "handler blew up on updateProject");
        assert_eq!(err.details().unwrap()["action_type"], "updateProject");
        assert_eq!(state.project.name, "Shop");

        // The engine keeps working after a caught panic.
        let next = apply_action(&action, &state).unwrap();
        assert_eq!(next.project.name, "Renamed");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "handler panicked");
    }
}
