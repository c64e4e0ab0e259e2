//! Planning-action engine for story maps.
//!
//! Language models propose changes to a project's planning graph as
//! *planning actions*. This crate decides which of them are safe and what
//! they do:
//!
//! - [`stream`] recovers actions from chunked, unreliable model output.
//! - [`action`] defines the wire envelope, the typed action set, and the
//!   id repair applied to model-produced actions.
//! - [`validate`] checks schema, references, and content policy.
//! - [`mutate`] applies an action to a copy of a [`state::PlanningState`].
//! - [`preview`] describes effects and runs all-or-nothing batches.
//! - [`pipeline`] persists accepted actions and audits every attempt.

pub mod action;
pub mod mutate;
pub mod pipeline;
pub mod preview;
pub mod state;
pub mod stream;
pub mod validate;

pub use action::{ActionKind, ActionType, PlanningAction, RawAction};
pub use mutate::{MutationError, MutationResult, apply_action};
pub use preview::{
    BatchApplied, BatchFailure, PreviewDelta, apply_action_batch, preview_action,
    preview_action_batch,
};
pub use state::{PlanningState, clone_planning_state, create_empty_planning_state};
pub use stream::{
    ActionStreamParser, ParserOptions, ResponseType, StreamEvent, parse_action_stream,
    parse_action_text,
};
pub use validate::{
    BatchValidation, ValidationError, ValidationErrorCode, ValidationResult, validate_action,
    validate_action_batch,
};
