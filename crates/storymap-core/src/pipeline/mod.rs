//! Persistence pipeline: take one submitted action from raw wire form to
//! durable storage, leaving an audit row either way.
//!
//! ```text
//! replay check -> load snapshot -> normalize -> validate -> mutate
//!              -> one store write -> audit row
//! ```
//!
//! Callers serialize submissions per project; the pipeline does not lock.

pub mod memory;
pub mod postgres;
pub mod store;

use std::fmt;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use storymap_db::models::{ActionRecord, CardContextLink, ValidationStatus};

use crate::action::{ActionKind, Normalizer, PlanningAction, RawAction};
use crate::mutate::MutationError;
use crate::preview::{PreviewDelta, apply_with_delta};
use crate::state::PlanningState;
use crate::validate::{ValidationError, ValidationResult, validate_action};

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::PlanningStore;

/// Why a submission was not applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Invalid(Vec<ValidationError>),
    Mutation(MutationError),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(errors) => {
                let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
                f.write_str(&reasons.join("; "))
            }
            Self::Mutation(e) => write!(f, "{e}"),
        }
    }
}

/// Result of [`submit_action`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Applied and persisted.
    Accepted {
        record: ActionRecord,
        delta: PreviewDelta,
    },
    /// Not applied; the audit row carries the reason.
    Rejected {
        record: ActionRecord,
        rejection: Rejection,
    },
    /// The idempotency key was seen before; nothing was done.
    Replayed { record: ActionRecord },
}

impl SubmitOutcome {
    pub fn record(&self) -> &ActionRecord {
        match self {
            Self::Accepted { record, .. }
            | Self::Rejected { record, .. }
            | Self::Replayed { record } => record,
        }
    }
}

/// Validate, apply and persist one action for `project_id`.
///
/// Rejections are outcomes, not errors. `Err` means the store failed or
/// the project does not exist; when a write fails after validation a
/// rejected audit row without the idempotency key is still attempted.
pub async fn submit_action(
    store: &dyn PlanningStore,
    project_id: Uuid,
    raw: RawAction,
    idempotency_key: Option<&str>,
) -> Result<SubmitOutcome> {
    if let Some(key) = idempotency_key {
        if let Some(record) = store.find_action_by_idempotency_key(project_id, key).await? {
            info!(%project_id, key, action_id = %record.action_id, "replayed submission");
            return Ok(SubmitOutcome::Replayed { record });
        }
    }

    let state = store
        .load_state(project_id)
        .await?
        .ok_or_else(|| anyhow!("project {project_id} not found"))?;

    let raw = Normalizer::new(Some(project_id)).normalize(raw);
    let audit = Audit {
        project_id,
        raw: &raw,
        idempotency_key,
    };

    let ValidationResult { action, errors } = validate_action(&raw, &state);
    let action = match action {
        Some(action) if errors.is_empty() => action,
        _ => return audit.reject(store, Rejection::Invalid(errors)).await,
    };

    let (next, delta) = match apply_with_delta(&action, &state) {
        Ok(applied) => applied,
        Err(e) => return audit.reject(store, Rejection::Mutation(e)).await,
    };

    if let Err(e) = persist(store, &action, &next).await {
        warn!(%project_id, action_id = %action.id, error = %e, "store write failed");
        let mut record = audit.record(
            ValidationStatus::Rejected,
            Some(format!("store write failed: {e}")),
        );
        // Keyless, so a retry with the same key runs the action again.
        record.idempotency_key = None;
        if let Err(audit_err) = store.insert_action_record(&record).await {
            warn!(error = %audit_err, "could not record failed write");
        }
        return Err(e);
    }

    let record = audit.record(ValidationStatus::Accepted, None);
    store
        .insert_action_record(&record)
        .await
        .context("failed to record accepted action")?;
    info!(
        %project_id,
        action_id = %action.id,
        summary = %delta.summary,
        "accepted action"
    );
    Ok(SubmitOutcome::Accepted { record, delta })
}

struct Audit<'a> {
    project_id: Uuid,
    raw: &'a RawAction,
    idempotency_key: Option<&'a str>,
}

impl Audit<'_> {
    fn record(&self, status: ValidationStatus, reason: Option<String>) -> ActionRecord {
        let now = Utc::now();
        ActionRecord {
            id: Uuid::new_v4(),
            project_id: self.project_id,
            action_id: self.raw.id.clone(),
            action_type: self.raw.action_type.clone(),
            target_ref: self.raw.target_ref.clone(),
            payload: self.raw.payload.clone(),
            validation_status: status,
            rejection_reason: reason,
            applied_at: (status == ValidationStatus::Accepted).then_some(now),
            idempotency_key: self.idempotency_key.map(str::to_owned),
            created_at: now,
        }
    }

    async fn reject(&self, store: &dyn PlanningStore, rejection: Rejection) -> Result<SubmitOutcome> {
        let record = self.record(ValidationStatus::Rejected, Some(rejection.to_string()));
        store
            .insert_action_record(&record)
            .await
            .context("failed to record rejected action")?;
        info!(
            project_id = %self.project_id,
            action_id = %self.raw.id,
            reason = %rejection,
            "rejected action"
        );
        Ok(SubmitOutcome::Rejected { record, rejection })
    }
}

/// Write the single entity `action` changed, as it appears in `next`.
async fn persist(store: &dyn PlanningStore, action: &PlanningAction, next: &PlanningState) -> Result<()> {
    let id = action.entity_id();
    let missing = |what: &str| anyhow!("applied state has no {what} {id}");

    match &action.kind {
        ActionKind::UpdateProject(_) => store.update_project(&next.project).await,
        ActionKind::CreateWorkflow(_) => {
            let workflow = next.workflows.get(&id).ok_or_else(|| missing("workflow"))?;
            store.insert_workflow(workflow).await
        }
        ActionKind::CreateActivity(_) => {
            let activity = next.activities.get(&id).ok_or_else(|| missing("activity"))?;
            store.insert_activity(activity).await
        }
        ActionKind::CreateStep(_) => {
            let step = next.steps.get(&id).ok_or_else(|| missing("step"))?;
            store.insert_step(step).await
        }
        ActionKind::CreateCard(_) => {
            let card = next.cards.get(&id).ok_or_else(|| missing("card"))?;
            store.insert_card(card).await
        }
        ActionKind::UpdateCard(_) | ActionKind::ReorderCard(_) => {
            let card = next.cards.get(&id).ok_or_else(|| missing("card"))?;
            store.update_card(card).await
        }
        ActionKind::LinkContextArtifact(p) => {
            let link = CardContextLink {
                card_id: p.card_id,
                context_artifact_id: p.context_artifact_id,
                usage_hint: p.usage_hint.clone(),
            };
            store.link_context_artifact(&link).await
        }
        ActionKind::UpsertPlannedFile(p) => {
            let file = next
                .find_planned_file(&p.card_id, &id)
                .ok_or_else(|| missing("planned file"))?;
            store.upsert_planned_file(file).await
        }
        ActionKind::ApprovePlannedFile(p) => {
            let file = next
                .find_planned_file(&p.card_id, &id)
                .ok_or_else(|| missing("planned file"))?;
            store.upsert_planned_file(file).await
        }
        ActionKind::UpsertCardKnowledgeItem(p) => {
            let item = next
                .find_knowledge_item(p.item_type, &p.card_id, &id)
                .ok_or_else(|| missing("knowledge item"))?;
            store.upsert_knowledge_item(item).await
        }
        ActionKind::SetCardKnowledgeStatus(p) => {
            let item = next
                .find_knowledge_item(p.item_type, &p.card_id, &id)
                .ok_or_else(|| missing("knowledge item"))?;
            store.upsert_knowledge_item(item).await
        }
    }
}
