//! Streaming action parser.
//!
//! Recovers planning actions from the incremental text output of a language
//! model. Input arrives in chunks split at arbitrary points. Two shapes are
//! understood:
//!
//! - **NDJSON**: one JSON object per line, emitted as soon as the line ends.
//!   Only lines that start at nesting depth 0 count, so the inner lines of
//!   a pretty-printed document are never mistaken for NDJSON.
//! - **Document**: when no line yielded anything, the whole response is
//!   interpreted once the input ends (wrapper envelope, bare action, array,
//!   code fence, prose around JSON).
//!
//! Malformed input is dropped, never raised. Every stream ends with exactly
//! one [`StreamEvent::Done`].

mod decode;
mod extract;

use std::fmt;
use std::str::FromStr;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::action::{Normalizer, RawAction};
use decode::Utf8Decoder;
use extract::{DepthTracker, Document, interpret_text};

/// Kind of response declared by a wrapper envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Actions,
    Clarification,
    Mixed,
}

impl ResponseType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Actions => "actions",
            Self::Clarification => "clarification",
            Self::Mixed => "mixed",
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actions" => Ok(Self::Actions),
            "clarification" => Ok(Self::Clarification),
            "mixed" => Ok(Self::Mixed),
            other => Err(format!("unknown response type: {other:?}")),
        }
    }
}

/// One item produced by the parser.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A normalized action, not yet validated.
    Action(RawAction),
    Message(String),
    ResponseType(ResponseType),
    Done,
}

/// Parser settings.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Used for actions whose `project_id` is missing or not a UUID.
    pub project_id: Option<Uuid>,
    /// Emit NDJSON lines as they complete. When off, only the whole
    /// response is interpreted at the end.
    pub ndjson: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            project_id: None,
            ndjson: true,
        }
    }
}

impl ParserOptions {
    pub fn for_project(project_id: Uuid) -> Self {
        Self {
            project_id: Some(project_id),
            ..Self::default()
        }
    }
}

/// Push-based parser state for one response.
///
/// Feed text with [`push`](Self::push) and close with
/// [`finish`](Self::finish); both return the events that became available.
#[derive(Debug)]
pub struct ActionStreamParser {
    options: ParserOptions,
    normalizer: Normalizer,
    tracker: DepthTracker,
    line: String,
    line_start_depth: usize,
    /// Whole response so far; dropped once NDJSON has produced output.
    text: Option<String>,
    finished: bool,
}

impl ActionStreamParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            normalizer: Normalizer::new(options.project_id),
            options,
            tracker: DepthTracker::default(),
            line: String::new(),
            line_start_depth: 0,
            text: Some(String::new()),
            finished: false,
        }
    }

    /// Number of ids replaced so far.
    pub fn remapped_ids(&self) -> usize {
        self.normalizer.remap().len()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        if let Some(text) = &mut self.text {
            text.push_str(chunk);
        }
        if !self.options.ndjson {
            return out;
        }

        for c in chunk.chars() {
            self.tracker.feed(c);
            if c == '\n' {
                self.complete_line(&mut out);
                self.line_start_depth = self.tracker.depth();
            } else {
                self.line.push(c);
            }
        }
        out
    }

    /// Flush the last line, fall back to whole-response interpretation if
    /// nothing was recognised, and emit `Done`. Later calls return nothing.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.finished = true;

        if self.options.ndjson && !self.line.is_empty() {
            self.complete_line(&mut out);
        }

        if let Some(text) = self.text.take() {
            match interpret_text(&text) {
                Some(doc) => self.emit(doc, &mut out),
                None if !text.trim().is_empty() => {
                    debug!(len = text.len(), "no actions recovered from response");
                }
                None => {}
            }
        }

        out.push(StreamEvent::Done);
        out
    }

    fn complete_line(&mut self, out: &mut Vec<StreamEvent>) {
        let line = std::mem::take(&mut self.line);
        if self.line_start_depth != 0 {
            return;
        }
        let trimmed = line.trim();
        if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
            return;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => match Document::from_value(value) {
                Some(doc) => {
                    self.text = None;
                    self.emit(doc, out);
                }
                None => debug!("ignoring JSON line that is neither an action nor a wrapper"),
            },
            Err(e) => debug!(error = %e, "dropping malformed NDJSON line"),
        }
    }

    fn emit(&mut self, doc: Document, out: &mut Vec<StreamEvent>) {
        if let Some(response_type) = doc.response_type {
            out.push(StreamEvent::ResponseType(response_type));
        }
        if let Some(message) = doc.message {
            out.push(StreamEvent::Message(message));
        }
        for value in doc.actions {
            match RawAction::from_value(value) {
                Some(raw) => out.push(StreamEvent::Action(self.normalizer.normalize(raw))),
                None => debug!("dropping action entry that is not an object"),
            }
        }
    }
}

/// Parse a chunked byte stream lazily.
///
/// Events are yielded as soon as they are recoverable. A read error ends
/// the input; the stream still finishes with [`StreamEvent::Done`].
/// Dropping the returned stream drops `input`.
pub fn parse_action_stream<S, B, E>(input: S, options: ParserOptions) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    async_stream::stream! {
        let mut input = std::pin::pin!(input);
        let mut decoder = Utf8Decoder::default();
        let mut parser = ActionStreamParser::new(options);

        while let Some(chunk) = input.next().await {
            match chunk {
                Ok(bytes) => {
                    let text = decoder.push(bytes.as_ref());
                    for event in parser.push(&text) {
                        yield event;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "error reading model output, ending stream");
                    break;
                }
            }
        }

        let tail = decoder.finish();
        for event in parser.push(&tail) {
            yield event;
        }
        for event in parser.finish() {
            yield event;
        }
    }
}

/// Parse a complete response with default options.
pub fn parse_action_text(text: &str) -> Vec<StreamEvent> {
    let mut parser = ActionStreamParser::new(ParserOptions::default());
    let mut events = parser.push(text);
    events.extend(parser.finish());
    events
}

/// Only the actions out of a list of events.
pub fn actions_of(events: impl IntoIterator<Item = StreamEvent>) -> Vec<RawAction> {
    events
        .into_iter()
        .filter_map(|e| match e {
            StreamEvent::Action(raw) => Some(raw),
            _ => None,
        })
        .collect()
}
