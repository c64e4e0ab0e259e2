//! Policy stage: planning actions must never carry a request for code.
//!
//! This is a heuristic content filter over every string in `target_ref`
//! and `payload`. It is not a security boundary.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{ValidationError, ValidationErrorCode};
use crate::action::RawAction;

static CODE_INTENT: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("generate code", r"(?i)\bgenerat(e|es|ing)\s+(the\s+|some\s+)?code\b"),
        ("write code", r"(?i)\bwrit(e|es|ing)\s+(the\s+|some\s+)?code\b"),
        (
            "implement the function",
            r"(?i)\bimplement\s+(the|this|that|a|an)\s+(function|method|class|component)\b",
        ),
        (
            "create a file that contains",
            r"(?i)\bcreate\s+a\s+file\s+(that|which)\s+contains?\b",
        ),
        ("code snippet", r"(?i)\bcode\s+snippets?\b"),
        ("production code", r"(?i)\bproduction[\s-]+code\b"),
        ("fenced code block", r"```"),
    ]
    .into_iter()
    .map(|(label, pattern)| (label, Regex::new(pattern).expect("valid policy regex")))
    .collect()
});

/// Report every string field of `raw` that expresses code-generation
/// intent. One error per offending field.
pub fn validate_policy(raw: &RawAction) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    scan(&raw.target_ref, "target_ref".to_owned(), &mut errors);
    scan(&raw.payload, "payload".to_owned(), &mut errors);
    errors
}

/// The first forbidden phrase found in `text`, if any.
pub fn code_intent(text: &str) -> Option<&'static str> {
    CODE_INTENT
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(label, _)| *label)
}

fn scan(value: &Value, path: String, errors: &mut Vec<ValidationError>) {
    match value {
        Value::String(text) => {
            if let Some(label) = code_intent(text) {
                errors.push(
                    ValidationError::new(
                        ValidationErrorCode::CodeGenerationDetected,
                        format!("planning actions must not request code ({label:?} found)"),
                    )
                    .with_field(path),
                );
            }
        }
        Value::Object(map) => {
            for (key, v) in map {
                scan(v, format!("{path}.{key}"), errors);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                scan(v, format!("{path}[{i}]"), errors);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
