//! Recovering JSON documents from model output.
//!
//! Everything here is string-aware: braces inside JSON string literals
//! never count towards nesting depth.

use serde_json::Value;

use super::ResponseType;

/// Running nesting depth over a text seen one char at a time.
///
/// Quotes only open a string at depth > 0, so apostrophes and quotes in
/// surrounding prose cannot derail the count.
#[derive(Debug, Clone, Default)]
pub(crate) struct DepthTracker {
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl DepthTracker {
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn feed(&mut self, c: char) {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == '"' {
                self.in_string = false;
            }
            return;
        }
        match c {
            '{' | '[' => self.depth += 1,
            '}' | ']' => self.depth = self.depth.saturating_sub(1),
            '"' if self.depth > 0 => self.in_string = true,
            _ => {}
        }
    }
}

/// The balanced `{...}` or `[...]` span starting at byte `start`, if the
/// text closes it.
pub(crate) fn balanced_span_at(text: &str, start: usize) -> Option<&str> {
    let mut tracker = DepthTracker::default();
    for (offset, c) in text[start..].char_indices() {
        tracker.feed(c);
        if tracker.depth() == 0 {
            let end = start + offset + c.len_utf8();
            return Some(&text[start..end]);
        }
    }
    None
}

/// Contents of the first markdown code fence, without its language tag.
pub(crate) fn strip_code_fence(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let tag_len = after
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after.len());
    let body = &after[tag_len..];
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

/// One recognised model response: an optional wrapper type and message
/// plus zero or more raw action objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Document {
    pub response_type: Option<ResponseType>,
    pub message: Option<String>,
    pub actions: Vec<Value>,
}

impl Document {
    /// Interpret a parsed JSON value as a wrapper, a bare action, or an
    /// array containing at least one action. Anything else is not a
    /// document.
    pub(crate) fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(mut obj) => {
                if is_action(&obj) {
                    return Some(Self {
                        actions: vec![Value::Object(obj)],
                        ..Self::default()
                    });
                }
                let declared = obj
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(|t| t.parse::<ResponseType>().ok());
                let actions = match obj.remove("actions") {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                };
                if declared.is_none() && actions.is_none() {
                    return None;
                }
                let actions = actions.unwrap_or_default();
                let message = obj
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_owned);
                let response_type = declared.unwrap_or(if actions.is_empty() {
                    ResponseType::Clarification
                } else {
                    ResponseType::Actions
                });
                Some(Self {
                    response_type: Some(response_type),
                    message,
                    actions,
                })
            }
            // Prose often carries unrelated lists; only an array holding
            // an action counts.
            Value::Array(items) => items
                .iter()
                .any(|v| v.as_object().is_some_and(is_action))
                .then(|| Self {
                    actions: items,
                    ..Self::default()
                }),
            _ => None,
        }
    }

    fn prose(text: &str) -> Self {
        Self {
            message: Some(text.to_owned()),
            ..Self::default()
        }
    }
}

fn is_action(obj: &serde_json::Map<String, Value>) -> bool {
    obj.contains_key("action_type") || obj.contains_key("actionType")
}

fn parse_document(text: &str) -> Option<Document> {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(Document::from_value)
}

/// Interpret a complete response.
///
/// Tries, in order: the whole text, the first code fence, then every
/// balanced span from left to right. Text with no JSON delimiters at all
/// is prose and becomes a message.
pub(crate) fn interpret_text(text: &str) -> Option<Document> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(doc) = parse_document(trimmed) {
        return Some(doc);
    }
    if let Some(doc) = strip_code_fence(trimmed).and_then(parse_document) {
        return Some(doc);
    }

    let starts = trimmed
        .char_indices()
        .filter(|(_, c)| matches!(c, '{' | '['))
        .map(|(i, _)| i);
    let mut saw_delimiter = false;
    for start in starts {
        saw_delimiter = true;
        if let Some(doc) = balanced_span_at(trimmed, start).and_then(parse_document) {
            return Some(doc);
        }
    }

    if saw_delimiter {
        None
    } else {
        Some(Document::prose(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn depth_ignores_braces_in_strings() {
        let mut t = DepthTracker::default();
        for c in r#"{"title": "use {braces} and \"quotes\" }"}"#.chars() {
            t.feed(c);
        }
        assert_eq!(t.depth(), 0);
    }

    #[test]
    fn depth_ignores_quotes_in_prose() {
        let mut t = DepthTracker::default();
        for c in r#"Here's the "plan": {"a": "}"}"#.chars() {
            t.feed(c);
        }
        assert_eq!(t.depth(), 0);
    }

    #[test]
    fn balanced_span_skips_string_content() {
        let text = r#"x {"a": "}{", "b": [1, {"c": 2}]} tail"#;
        let span = balanced_span_at(text, 2).unwrap();
        assert_eq!(span, r#"{"a": "}{", "b": [1, {"c": 2}]}"#);
        assert!(balanced_span_at("{\"open\": [", 0).is_none());
    }

    #[test]
    fn fence_language_tag_is_dropped() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), Some("{\"a\":1}"));
        assert_eq!(strip_code_fence("text ```\n[1]\n``` more"), Some("[1]"));
        assert_eq!(strip_code_fence("no fence"), None);
    }

    #[test]
    fn wrapper_document() {
        let doc = Document::from_value(json!({
            "type": "mixed",
            "message": " Added a card. ",
            "actions": [{"action_type": "createCard"}]
        }))
        .unwrap();
        assert_eq!(doc.response_type, Some(ResponseType::Mixed));
        assert_eq!(doc.message.as_deref(), Some("Added a card."));
        assert_eq!(doc.actions.len(), 1);
    }

    #[test]
    fn wrapper_type_is_inferred() {
        let doc = Document::from_value(json!({"message": "Which payment provider?", "actions": []}))
            .unwrap();
        assert_eq!(doc.response_type, Some(ResponseType::Clarification));
    }

    #[test]
    fn unrelated_object_is_not_a_document() {
        assert!(Document::from_value(json!({"hello": "world"})).is_none());
        assert!(Document::from_value(json!("text")).is_none());
    }

    #[test]
    fn prose_around_json_is_tolerated() {
        let doc = interpret_text(
            "Sure! Here are the actions: {\"type\": \"actions\", \"actions\": [{\"action_type\": \"createWorkflow\"}]} Let me know.",
        )
        .unwrap();
        assert_eq!(doc.actions.len(), 1);
    }

    #[test]
    fn arrays_without_actions_are_not_documents() {
        assert!(Document::from_value(json!([])).is_none());
        assert!(Document::from_value(json!([1, 2])).is_none());
        assert!(Document::from_value(json!([{"title": "x"}])).is_none());
        let doc = Document::from_value(json!([1, {"actionType": "createCard"}])).unwrap();
        assert_eq!(doc.actions.len(), 2);
    }

    #[test]
    fn prose_without_json_is_a_message() {
        let doc = interpret_text("  What currency do you sell in?  ").unwrap();
        assert_eq!(doc.message.as_deref(), Some("What currency do you sell in?"));
        assert!(doc.actions.is_empty());
    }

    #[test]
    fn broken_json_yields_nothing() {
        assert!(interpret_text("[ invalid json ").is_none());
        assert!(interpret_text("   ").is_none());
    }
}
