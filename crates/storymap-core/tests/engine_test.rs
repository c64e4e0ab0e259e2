//! Integration tests for validation, mutation, preview and batches over a
//! small seeded story map.

use serde_json::{Value, json};
use uuid::Uuid;

use storymap_core::action::{ActionKind, UpsertCardKnowledgeItem};
use storymap_core::mutate::MutationError;
use storymap_core::preview::{apply_action_batch, preview_action, preview_action_batch};
use storymap_core::validate::{ValidationErrorCode, validate_action, validate_action_batch};
use storymap_core::{PlanningAction, PlanningState, RawAction, apply_action};
use storymap_db::models::{
    Activity, ArtifactType, Card, CardStatus, ContextArtifact, KnowledgeItemType, KnowledgeSource,
    KnowledgeStatus, PlannedFileStatus, Project, Workflow,
};

// ===========================================================================
// Fixtures
// ===========================================================================

struct Map {
    state: PlanningState,
    workflow: Uuid,
    activity: Uuid,
}

fn seeded() -> Map {
    let project = Project::new(Uuid::new_v4(), "Bookshop");
    let mut state = PlanningState::empty(project);
    let workflow = Workflow {
        id: Uuid::new_v4(),
        project_id: state.project.id,
        title: "Browse & Search".into(),
        description: None,
        build_state: None,
        position: 0,
    };
    let activity = Activity {
        id: Uuid::new_v4(),
        workflow_id: workflow.id,
        title: "Find a book".into(),
        color: Some("#88c".into()),
        position: 0,
    };
    let (workflow_id, activity_id) = (workflow.id, activity.id);
    state.workflows.insert(workflow.id, workflow);
    state.activities.insert(activity.id, activity);
    Map {
        state,
        workflow: workflow_id,
        activity: activity_id,
    }
}

fn raw(state: &PlanningState, action_type: &str, target_ref: Value, payload: Value) -> RawAction {
    RawAction::new(
        Uuid::new_v4().to_string(),
        state.project.id.to_string(),
        action_type,
        target_ref,
        payload,
    )
}

fn typed(state: &PlanningState, raw: &RawAction) -> PlanningAction {
    let result = validate_action(raw, state);
    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    result.action.expect("typed action")
}

fn create_card(state: &PlanningState, activity: Uuid, id: Uuid, title: &str) -> RawAction {
    raw(
        state,
        "createCard",
        json!({"workflow_activity_id": activity}),
        json!({"id": id, "title": title}),
    )
}

// ===========================================================================
// Validation
// ===========================================================================

#[test]
fn invalid_action_id_is_exactly_one_schema_error() {
    let m = seeded();
    let mut action = raw(
        &m.state,
        "createWorkflow",
        json!({"project_id": m.state.project.id}),
        json!({"title": "Checkout"}),
    );
    action.id = "not-a-uuid".into();

    let result = validate_action(&action, &m.state);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, ValidationErrorCode::InvalidSchema);
}

#[test]
fn empty_required_title_is_a_schema_error() {
    let m = seeded();
    let action = raw(
        &m.state,
        "createActivity",
        json!({"workflow_id": m.workflow}),
        json!({"title": ""}),
    );
    let result = validate_action(&action, &m.state);
    assert!(!result.errors.is_empty());
    assert!(result.errors.iter().any(|e| e.code == ValidationErrorCode::InvalidSchema));
}

#[test]
fn create_activity_references_are_checked() {
    let m = seeded();
    let dangling = raw(
        &m.state,
        "createActivity",
        json!({"workflow_id": Uuid::new_v4()}),
        json!({"title": "Pay"}),
    );
    let errors = validate_action(&dangling, &m.state).errors;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ValidationErrorCode::ReferentialIntegrity);

    let resolved = raw(
        &m.state,
        "createActivity",
        json!({"workflow_id": m.workflow}),
        json!({"title": "Pay"}),
    );
    assert!(validate_action(&resolved, &m.state).errors.is_empty());
}

#[test]
fn generate_code_is_rejected_by_policy() {
    let m = seeded();
    let action = raw(
        &m.state,
        "createCard",
        json!({"workflow_activity_id": m.activity}),
        json!({"title": "Search", "description": "Please generate code for the search box"}),
    );
    let result = validate_action(&action, &m.state);
    assert!(result.action.is_some(), "schema stage should pass");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, ValidationErrorCode::CodeGenerationDetected);
    assert_eq!(result.errors[0].field.as_deref(), Some("payload.description"));
}

#[test]
fn batch_validation_reports_every_failing_index() {
    let m = seeded();
    let card = Uuid::new_v4();
    let batch = vec![
        create_card(&m.state, m.activity, card, "Search by title"),
        raw(
            &m.state,
            "upsertCardKnowledgeItem",
            json!({"card_id": card}),
            json!({"item_type": "requirement", "text": "Matches partial titles"}),
        ),
        raw(&m.state, "updateCard", json!({"card_id": Uuid::new_v4()}), json!({"title": "x"})),
        raw(&m.state, "createStep", json!({"workflow_activity_id": m.activity}), json!({})),
    ];

    let result = validate_action_batch(&batch, &m.state, false);
    assert!(!result.valid);
    assert_eq!(result.per_action.len(), 4);
    assert!(result.per_action[0].is_valid());
    assert!(result.per_action[1].is_valid(), "sees the card created by action 0");
    let mut failing: Vec<_> = result.errors.iter().filter_map(|e| e.action_index).collect();
    failing.dedup();
    assert_eq!(failing, vec![2, 3]);
}

// ===========================================================================
// Mutation
// ===========================================================================

#[test]
fn apply_never_mutates_its_input() {
    let m = seeded();
    let before = m.state.clone();
    let action = typed(
        &m.state,
        &create_card(&m.state, m.activity, Uuid::new_v4(), "Search by author"),
    );

    let next = apply_action(&action, &m.state).expect("applies");
    assert_eq!(m.state, before);
    assert_eq!(next.card_count(), 1);
    assert_eq!(m.state.card_count(), 0);
}

#[test]
fn created_card_gets_defaults_and_append_position() {
    let m = seeded();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let s1 = apply_action(
        &typed(&m.state, &create_card(&m.state, m.activity, first, "A")),
        &m.state,
    )
    .unwrap();
    let s2 = apply_action(&typed(&s1, &create_card(&s1, m.activity, second, "B")), &s1).unwrap();

    let card = &s2.cards[&second];
    assert_eq!(card.status, CardStatus::Todo);
    assert_eq!(card.priority, 0);
    assert_eq!(s2.cards[&first].position, 0);
    assert_eq!(card.position, 1);
}

#[test]
fn missing_create_id_is_derived_deterministically() {
    let m = seeded();
    let action = typed(
        &m.state,
        &raw(
            &m.state,
            "createWorkflow",
            json!({"project_id": m.state.project.id}),
            json!({"title": "Checkout"}),
        ),
    );
    let a = apply_action(&action, &m.state).unwrap();
    let b = apply_action(&action, &m.state).unwrap();
    assert_eq!(a, b);
    assert!(a.workflows.contains_key(&action.entity_id()));
}

#[test]
fn unknown_target_is_mutation_failed() {
    let m = seeded();
    let action = PlanningAction {
        id: Uuid::new_v4(),
        project_id: m.state.project.id,
        kind: ActionKind::UpdateCard(storymap_core::action::UpdateCard {
            card_id: Uuid::new_v4(),
            title: Some("Ghost".into()),
            description: None,
            status: None,
            priority: None,
        }),
    };
    let err = apply_action(&action, &m.state).unwrap_err();
    assert!(matches!(err, MutationError::MutationFailed { .. }));
    assert_eq!(err.code(), "mutation_failed");
}

#[test]
fn negative_position_is_constraint_violation() {
    let m = seeded();
    let action = PlanningAction {
        id: Uuid::new_v4(),
        project_id: m.state.project.id,
        kind: ActionKind::CreateStep(storymap_core::action::CreateStep {
            workflow_activity_id: m.activity,
            id: None,
            title: "Filter".into(),
            position: Some(-1),
        }),
    };
    let err = apply_action(&action, &m.state).unwrap_err();
    assert_eq!(err.code(), "constraint_violation");
}

#[test]
fn append_after_max_position_is_constraint_violation() {
    let mut m = seeded();
    let last = Uuid::new_v4();
    m.state.cards.insert(
        last,
        Card {
            id: last,
            activity_id: m.activity,
            step_id: None,
            title: "Last".into(),
            description: None,
            status: CardStatus::Todo,
            priority: 0,
            position: i32::MAX,
        },
    );

    let action = typed(&m.state, &create_card(&m.state, m.activity, Uuid::new_v4(), "Next"));
    let err = apply_action(&action, &m.state).unwrap_err();
    assert_eq!(err.code(), "constraint_violation");
    assert_eq!(err.details().unwrap()["value"], i32::MAX);
}

#[test]
fn knowledge_item_id_cannot_move_to_another_card() {
    let m = seeded();
    let (card1, card2, item) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let mut state = m.state.clone();
    for (card, title) in [(card1, "Search"), (card2, "Checkout")] {
        state = apply_action(&typed(&state, &create_card(&state, m.activity, card, title)), &state)
            .unwrap();
    }
    let upsert = |state: &PlanningState, card: Uuid, item_type: &str| {
        raw(
            state,
            "upsertCardKnowledgeItem",
            json!({"card_id": card}),
            json!({"item_type": item_type, "knowledge_item_id": item, "text": "Guest checkout"}),
        )
    };
    state = apply_action(&typed(&state, &upsert(&state, card1, "fact")), &state).unwrap();

    for (card, item_type, kind) in [
        (card2, "requirement", KnowledgeItemType::Requirement),
        (card2, "fact", KnowledgeItemType::Fact),
        (card1, "assumption", KnowledgeItemType::Assumption),
    ] {
        let errors = validate_action(&upsert(&state, card, item_type), &state).errors;
        assert_eq!(errors.len(), 1, "{item_type} on {card}");
        assert_eq!(errors[0].code, ValidationErrorCode::DuplicateEntry);

        let action = PlanningAction {
            id: Uuid::new_v4(),
            project_id: state.project.id,
            kind: ActionKind::UpsertCardKnowledgeItem(UpsertCardKnowledgeItem {
                card_id: card,
                item_type: kind,
                knowledge_item_id: Some(item),
                text: "Guest checkout".into(),
                evidence_source: None,
                confidence: None,
                source: None,
                position: None,
            }),
        };
        let err = apply_action(&action, &state).unwrap_err();
        assert_eq!(err.code(), "constraint_violation");
    }

    // Same card and type is an update, not a collision.
    let again = upsert(&state, card1, "fact");
    assert!(validate_action(&again, &state).errors.is_empty());
    let next = apply_action(&typed(&state, &again), &state).unwrap();
    assert_eq!(next.knowledge_items(KnowledgeItemType::Fact)[&card1].len(), 1);
}

#[test]
fn knowledge_item_lifecycle() {
    let m = seeded();
    let card = Uuid::new_v4();
    let item = Uuid::new_v4();
    let s1 = apply_action(
        &typed(&m.state, &create_card(&m.state, m.activity, card, "Search")),
        &m.state,
    )
    .unwrap();
    let s2 = apply_action(
        &typed(
            &s1,
            &raw(
                &s1,
                "upsertCardKnowledgeItem",
                json!({"card_id": card}),
                json!({"item_type": "question", "knowledge_item_id": item,
                       "text": "Search by ISBN too?", "confidence": 0.4}),
            ),
        ),
        &s1,
    )
    .unwrap();
    let created = s2
        .find_knowledge_item(KnowledgeItemType::Question, &card, &item)
        .unwrap();
    assert_eq!(created.status, KnowledgeStatus::Draft);
    assert_eq!(created.source, KnowledgeSource::Agent);

    let s3 = apply_action(
        &typed(
            &s2,
            &raw(
                &s2,
                "setCardKnowledgeStatus",
                json!({"card_id": card, "knowledge_item_id": item}),
                json!({"item_type": "question", "status": "approved"}),
            ),
        ),
        &s2,
    )
    .unwrap();
    let approved = s3
        .find_knowledge_item(KnowledgeItemType::Question, &card, &item)
        .unwrap();
    assert_eq!(approved.status, KnowledgeStatus::Approved);
}

#[test]
fn planned_file_upsert_and_approval() {
    let m = seeded();
    let card = Uuid::new_v4();
    let file = Uuid::new_v4();
    let s1 = apply_action(
        &typed(&m.state, &create_card(&m.state, m.activity, card, "Search")),
        &m.state,
    )
    .unwrap();
    let upsert = |state: &PlanningState, source: &str| {
        raw(
            state,
            "upsertPlannedFile",
            json!({"card_id": card}),
            json!({"planned_file_id": file, "logical_file_name": "SearchBox",
                   "artifact_kind": "component", "action": "create",
                   "intent_summary": "Text input with suggestions", "source": source}),
        )
    };

    let s2 = apply_action(&typed(&s1, &upsert(&s1, "agent")), &s1).unwrap();
    assert_eq!(
        s2.find_planned_file(&card, &file).unwrap().status,
        PlannedFileStatus::Proposed
    );

    let s3 = apply_action(&typed(&s2, &upsert(&s2, "user")), &s2).unwrap();
    assert_eq!(
        s3.find_planned_file(&card, &file).unwrap().status,
        PlannedFileStatus::UserEdited
    );
    assert_eq!(s3.card_planned_files[&card].len(), 1);

    let approve = raw(
        &s3,
        "approvePlannedFile",
        json!({"card_id": card, "planned_file_id": file}),
        json!({}),
    );
    let s4 = apply_action(&typed(&s3, &approve), &s3).unwrap();
    assert_eq!(
        s4.find_planned_file(&card, &file).unwrap().status,
        PlannedFileStatus::Approved
    );
}

#[test]
fn reorder_moves_card_between_steps() {
    let m = seeded();
    let card = Uuid::new_v4();
    let step = Uuid::new_v4();
    let batch = [
        create_card(&m.state, m.activity, card, "Search"),
        raw(
            &m.state,
            "createStep",
            json!({"workflow_activity_id": m.activity}),
            json!({"id": step, "title": "Refine"}),
        ),
    ];
    let validated = validate_action_batch(&batch, &m.state, true);
    let applied = apply_action_batch(&validated.valid_actions().unwrap(), &m.state).unwrap();
    let s = applied.final_state;

    let reorder = raw(
        &s,
        "reorderCard",
        json!({"card_id": card}),
        json!({"new_position": 4, "step_id": step}),
    );
    let moved = apply_action(&typed(&s, &reorder), &s).unwrap();
    assert_eq!(moved.cards[&card].step_id, Some(step));
    assert_eq!(moved.cards[&card].position, 4);

    let detach = raw(
        &moved,
        "reorderCard",
        json!({"card_id": card}),
        json!({"new_position": 0, "step_id": null}),
    );
    let detached = apply_action(&typed(&moved, &detach), &moved).unwrap();
    assert_eq!(detached.cards[&card].step_id, None);
}

#[test]
fn link_context_artifact_adds_to_card_set() {
    let mut m = seeded();
    let artifact = ContextArtifact {
        id: Uuid::new_v4(),
        project_id: m.state.project.id,
        name: "search-research".into(),
        artifact_type: ArtifactType::Research,
        title: None,
        content: None,
        uri: Some("https://example.com/notes".into()),
        integration_ref: None,
    };
    let artifact_id = artifact.id;
    m.state.context_artifacts.insert(artifact.id, artifact);

    let card = Uuid::new_v4();
    let s1 = apply_action(
        &typed(&m.state, &create_card(&m.state, m.activity, card, "Search")),
        &m.state,
    )
    .unwrap();
    let link = raw(
        &s1,
        "linkContextArtifact",
        json!({"card_id": card}),
        json!({"context_artifact_id": artifact_id, "usage_hint": "ranking ideas"}),
    );
    let action = typed(&s1, &link);
    let s2 = apply_action(&action, &s1).unwrap();
    assert!(s2.card_context_links[&card].contains(&artifact_id));

    let delta = preview_action(&action, &s1).unwrap();
    assert_eq!(delta.updated_ids, vec![card]);
    assert_eq!(delta.summary, "linkContextArtifact: Search <- search-research");
}

#[test]
fn update_project_changes_only_given_fields() {
    let m = seeded();
    let action = typed(
        &m.state,
        &raw(
            &m.state,
            "updateProject",
            json!({"project_id": m.state.project.id}),
            json!({"tech_stack": "Rust + Postgres"}),
        ),
    );
    let next = apply_action(&action, &m.state).unwrap();
    assert_eq!(next.project.tech_stack.as_deref(), Some("Rust + Postgres"));
    assert_eq!(next.project.name, "Bookshop");
    assert_eq!(next.project.default_branch, "main");
}

// ===========================================================================
// Preview and batches
// ===========================================================================

#[test]
fn preview_summarizes_created_workflow() {
    let m = seeded();
    let action = typed(
        &m.state,
        &raw(
            &m.state,
            "createWorkflow",
            json!({"project_id": m.state.project.id}),
            json!({"title": "Browse & Search"}),
        ),
    );
    let delta = preview_action(&action, &m.state).unwrap();
    assert_eq!(delta.summary, "createWorkflow: Browse & Search");
    assert_eq!(delta.created_ids, vec![action.entity_id()]);
    assert!(delta.updated_ids.is_empty());
    assert!(delta.deleted_ids.is_empty());
    assert_eq!(m.state.workflows.len(), 1, "preview leaves state alone");
}

#[test]
fn preview_of_failing_action_is_none() {
    let m = seeded();
    let action = PlanningAction {
        id: Uuid::new_v4(),
        project_id: m.state.project.id,
        kind: ActionKind::ReorderCard(storymap_core::action::ReorderCard {
            card_id: Uuid::new_v4(),
            new_position: 0,
            step_id: None,
        }),
    };
    assert!(preview_action(&action, &m.state).is_none());
}

#[test]
fn failing_batch_applies_nothing() {
    let m = seeded();
    let before = m.state.clone();
    let ok = typed(
        &m.state,
        &create_card(&m.state, m.activity, Uuid::new_v4(), "Search"),
    );
    let broken = PlanningAction {
        id: Uuid::new_v4(),
        project_id: m.state.project.id,
        kind: ActionKind::UpdateCard(storymap_core::action::UpdateCard {
            card_id: Uuid::new_v4(),
            title: None,
            description: None,
            status: Some(CardStatus::Active),
            priority: None,
        }),
    };

    let failure = apply_action_batch(&[ok.clone(), broken], &m.state).unwrap_err();
    assert_eq!(failure.failed_at_index, 1);
    assert_eq!(failure.error.code(), "mutation_failed");
    assert_eq!(m.state, before);

    let applied = apply_action_batch(&[ok], &m.state).unwrap();
    assert_eq!(applied.applied_count, 1);
    assert_eq!(applied.final_state.card_count(), 1);
}

#[test]
fn batch_preview_is_repeatable_and_pure() {
    let m = seeded();
    let card = Uuid::new_v4();
    let batch = [
        create_card(&m.state, m.activity, card, "Search"),
        raw(
            &m.state,
            "upsertCardKnowledgeItem",
            json!({"card_id": card}),
            json!({"item_type": "fact", "text": "Most users search by title"}),
        ),
        raw(
            &m.state,
            "updateCard",
            json!({"card_id": card}),
            json!({"status": "active", "priority": 2}),
        ),
    ];
    let actions = validate_action_batch(&batch, &m.state, true)
        .valid_actions()
        .unwrap();
    let cards_before = m.state.card_count();

    let first = preview_action_batch(&actions, &m.state).unwrap();
    let second = preview_action_batch(&actions, &m.state).unwrap();
    assert_eq!(first, second);
    assert_eq!(m.state.card_count(), cards_before);

    assert_eq!(first.len(), 3);
    assert_eq!(first[0].created_ids, vec![card]);
    assert_eq!(first[1].created_ids.len(), 1);
    assert_eq!(first[2].updated_ids, vec![card]);
    assert_eq!(first[2].summary, "updateCard: Search");
}

#[test]
fn batch_preview_is_all_or_nothing() {
    let m = seeded();
    let ok = typed(
        &m.state,
        &create_card(&m.state, m.activity, Uuid::new_v4(), "Search"),
    );
    let broken = PlanningAction {
        id: Uuid::new_v4(),
        project_id: m.state.project.id,
        kind: ActionKind::CreateActivity(storymap_core::action::CreateActivity {
            workflow_id: Uuid::new_v4(),
            id: None,
            title: "Orphan".into(),
            color: None,
            position: None,
        }),
    };
    assert!(preview_action_batch(&[ok, broken], &m.state).is_none());
}
