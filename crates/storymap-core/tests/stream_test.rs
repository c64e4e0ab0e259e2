//! Integration tests for the streaming action parser: chunking, wrapper
//! envelopes, id repair and failure handling.

use futures::StreamExt;
use serde_json::{Value, json};
use uuid::Uuid;

use storymap_core::stream::actions_of;
use storymap_core::{
    ParserOptions, RawAction, ResponseType, StreamEvent, parse_action_stream, parse_action_text,
};

// ===========================================================================
// Helpers
// ===========================================================================

async fn collect_chunks(chunks: Vec<Vec<u8>>, options: ParserOptions) -> Vec<StreamEvent> {
    let input = futures::stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
    parse_action_stream(input, options).collect().await
}

fn done_count(events: &[StreamEvent]) -> usize {
    events.iter().filter(|e| **e == StreamEvent::Done).count()
}

fn ndjson_response(project_id: Uuid) -> String {
    let lines = [
        json!({"id": Uuid::new_v4(), "project_id": project_id, "action_type": "createWorkflow",
               "target_ref": {"project_id": project_id}, "payload": {"title": "Café checkout"}}),
        json!({"id": Uuid::new_v4(), "project_id": project_id, "action_type": "createActivity",
               "target_ref": {"workflow_id": Uuid::new_v4()}, "payload": {"title": "Pay"}}),
        json!({"id": Uuid::new_v4(), "project_id": project_id, "action_type": "createCard",
               "target_ref": {"workflow_activity_id": Uuid::new_v4()},
               "payload": {"title": "Card with {braces} and \"quotes\""}}),
    ];
    lines
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

// ===========================================================================
// Chunking
// ===========================================================================

#[tokio::test]
async fn char_by_char_equals_single_chunk() {
    let project_id = Uuid::new_v4();
    let text = ndjson_response(project_id);

    let whole = collect_chunks(vec![text.clone().into_bytes()], ParserOptions::default()).await;
    let split: Vec<Vec<u8>> = text.chars().map(|c| c.to_string().into_bytes()).collect();
    let by_char = collect_chunks(split, ParserOptions::default()).await;

    assert_eq!(actions_of(whole.clone()).len(), 3);
    assert_eq!(actions_of(whole), actions_of(by_char));
}

#[tokio::test]
async fn multibyte_characters_split_across_byte_chunks() {
    let text = ndjson_response(Uuid::new_v4());
    let bytes = text.into_bytes();
    let single_bytes: Vec<Vec<u8>> = bytes.iter().map(|b| vec![*b]).collect();

    let events = collect_chunks(single_bytes, ParserOptions::default()).await;
    let actions = actions_of(events);
    assert_eq!(actions.len(), 3);
    assert_eq!(actions[0].payload["title"], "Café checkout");
}

#[tokio::test]
async fn pretty_printed_wrapper_split_into_chunks() {
    let doc = serde_json::to_string_pretty(&json!({
        "type": "mixed",
        "message": "Here is a first cut.",
        "actions": [
            {"action_type": "createWorkflow", "target_ref": {}, "payload": {"title": "A"}},
            {"action_type": "createWorkflow", "target_ref": {}, "payload": {"title": "B"}}
        ]
    }))
    .unwrap();
    let chunks: Vec<Vec<u8>> = doc.as_bytes().chunks(7).map(<[u8]>::to_vec).collect();

    let events = collect_chunks(chunks, ParserOptions::default()).await;
    assert_eq!(events[0], StreamEvent::ResponseType(ResponseType::Mixed));
    assert_eq!(events[1], StreamEvent::Message("Here is a first cut.".into()));
    assert_eq!(actions_of(events.clone()).len(), 2);
    assert_eq!(events.last(), Some(&StreamEvent::Done));
}

// ===========================================================================
// Malformed and degenerate input
// ===========================================================================

#[test]
fn invalid_json_yields_no_actions_and_one_done() {
    let events = parse_action_text("[ invalid json ");
    assert!(actions_of(events.clone()).is_empty());
    assert_eq!(done_count(&events), 1);
}

#[test]
fn empty_input_is_just_done() {
    assert_eq!(parse_action_text(""), vec![StreamEvent::Done]);
}

#[test]
fn malformed_lines_are_skipped_between_good_ones() {
    let good = json!({"id": Uuid::new_v4(), "action_type": "createWorkflow",
                      "target_ref": {}, "payload": {"title": "Kept"}});
    let text = format!("{good}\n{{\"action_type\": createCard}}\n{good}\n");
    let events = parse_action_text(&text);
    assert_eq!(actions_of(events.clone()).len(), 2);
    assert_eq!(done_count(&events), 1);
}

#[tokio::test]
async fn read_error_still_ends_with_done() {
    let line = json!({"id": Uuid::new_v4(), "action_type": "createWorkflow",
                      "target_ref": {}, "payload": {"title": "Before the error"}});
    let input = futures::stream::iter(vec![
        Ok(format!("{line}\n").into_bytes()),
        Err(std::io::Error::other("connection reset")),
        Ok(format!("{line}\n").into_bytes()),
    ]);

    let events: Vec<StreamEvent> = parse_action_stream(input, ParserOptions::default())
        .collect()
        .await;
    assert_eq!(actions_of(events.clone()).len(), 1);
    assert_eq!(events.last(), Some(&StreamEvent::Done));
    assert_eq!(done_count(&events), 1);
}

// ===========================================================================
// Document shapes
// ===========================================================================

#[test]
fn clarification_wrapper_emits_type_and_message() {
    let text = json!({
        "type": "clarification",
        "message": "Should guests be able to check out?",
        "actions": []
    })
    .to_string();
    let events = parse_action_text(&text);

    assert!(events.contains(&StreamEvent::ResponseType(ResponseType::Clarification)));
    assert!(events.contains(&StreamEvent::Message(
        "Should guests be able to check out?".into()
    )));
    assert!(actions_of(events.clone()).is_empty());
    assert_eq!(events.last(), Some(&StreamEvent::Done));
}

#[test]
fn fenced_json_inside_prose() {
    let text = "Sure, here you go:\n```json\n[\n  {\"action_type\": \"create_workflow\", \"payload\": {\"title\": \"Search\"}}\n]\n```\nLet me know.";
    let actions = actions_of(parse_action_text(text));
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action_type, "createWorkflow");
}

#[test]
fn prose_only_becomes_a_message() {
    let events = parse_action_text("I need to know more about your users first.");
    assert_eq!(
        events,
        vec![
            StreamEvent::Message("I need to know more about your users first.".into()),
            StreamEvent::Done,
        ]
    );
}

#[test]
fn events_serialize_with_tag_and_data() {
    let value = serde_json::to_value(StreamEvent::ResponseType(ResponseType::Actions)).unwrap();
    assert_eq!(value, json!({"event": "response_type", "data": "actions"}));
    let done = serde_json::to_value(StreamEvent::Done).unwrap();
    assert_eq!(done, json!({"event": "done"}));
}

#[test]
fn plain_lists_in_leading_prose_do_not_hide_the_wrapper() {
    let text = r#"I considered options [1, 2] and [] and here is the plan: {"type": "actions", "message": "One workflow.", "actions": [{"action_type": "createWorkflow", "payload": {"title": "Checkout"}}]}"#;
    let events = parse_action_text(text);

    assert_eq!(events.first(), Some(&StreamEvent::ResponseType(ResponseType::Actions)));
    assert_eq!(events.last(), Some(&StreamEvent::Done));
    let actions = actions_of(events);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].payload["title"], "Checkout");
}

// ===========================================================================
// Id repair
// ===========================================================================

#[test]
fn model_ids_are_remapped_consistently() {
    let text = [
        json!({"id": "a1", "action_type": "createCard",
               "target_ref": {"workflow_activity_id": Uuid::new_v4()},
               "payload": {"id": "card-1", "title": "Search"}}),
        json!({"id": "a2", "action_type": "upsertCardKnowledgeItem",
               "target_ref": {"card_id": "card-1"},
               "payload": {"item_type": "fact", "text": "Users search by title"}}),
    ]
    .iter()
    .map(Value::to_string)
    .collect::<Vec<_>>()
    .join("\n");

    let actions = actions_of(parse_action_text(&text));
    assert_eq!(actions.len(), 2);

    let card_id = actions[0].payload["id"].as_str().unwrap();
    assert!(Uuid::parse_str(card_id).is_ok());
    assert_eq!(actions[1].target_ref["card_id"], card_id);
    for action in &actions {
        assert!(Uuid::parse_str(&action.id).is_ok());
    }
}

#[test]
fn action_id_reusing_an_entity_id_keeps_the_reference() {
    let text = [
        json!({"id": "a1", "action_type": "createCard",
               "target_ref": {"workflow_activity_id": Uuid::new_v4()},
               "payload": {"id": "c1", "title": "Pay"}}),
        json!({"id": "c1", "action_type": "upsertCardKnowledgeItem",
               "target_ref": {"card_id": "c1"},
               "payload": {"item_type": "fact", "text": "Card only"}}),
    ]
    .iter()
    .map(Value::to_string)
    .collect::<Vec<_>>()
    .join("\n");

    let actions = actions_of(parse_action_text(&text));
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[1].target_ref["card_id"], actions[0].payload["id"]);
    assert_ne!(Value::String(actions[1].id.clone()), actions[0].payload["id"]);
}

#[tokio::test]
async fn missing_project_id_takes_the_parser_default() {
    let project_id = Uuid::new_v4();
    let line = json!({"id": Uuid::new_v4(), "action_type": "createWorkflow",
                      "target_ref": {}, "payload": {"title": "A"}});
    let events = collect_chunks(
        vec![line.to_string().into_bytes()],
        ParserOptions::for_project(project_id),
    )
    .await;

    let actions: Vec<RawAction> = actions_of(events);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].project_id, project_id.to_string());
}

#[test]
fn loose_action_type_spellings_are_canonicalized() {
    let text = json!({"action_type": "Update-Card", "target_ref": {"card_id": Uuid::new_v4()},
                      "payload": {"title": "Renamed"}})
    .to_string();
    let actions = actions_of(parse_action_text(&text));
    assert_eq!(actions[0].action_type, "updateCard");
}
