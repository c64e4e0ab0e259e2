use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Declares a text-backed enum together with its `Display`/`FromStr` pair and
/// a dedicated parse error. The wire, serde and SQL spellings all agree.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident / $err:ident ($label:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[sqlx(type_name = "text", rename_all = "snake_case")]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            /// The canonical text spelling.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = $err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err($err(other.to_owned())),
                }
            }
        }

        #[doc = concat!("Error returned when parsing an invalid [`", stringify!($name), "`] string.")]
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        #[error("invalid {label}: {0:?}", label = $label)]
        pub struct $err(pub String);
    };
}

text_enum! {
    /// Board column a card sits in.
    pub enum CardStatus / CardStatusParseError ("card status") {
        Todo => "todo",
        Active => "active",
        Questions => "questions",
        Review => "review",
        Production => "production",
    }
}

text_enum! {
    /// Kind of context artifact attached to a project.
    pub enum ArtifactType / ArtifactTypeParseError ("artifact type") {
        Doc => "doc",
        Design => "design",
        Code => "code",
        Research => "research",
        Link => "link",
        Image => "image",
        Skill => "skill",
        Mcp => "mcp",
        Cli => "cli",
        Api => "api",
        Prompt => "prompt",
        Spec => "spec",
        Runbook => "runbook",
        Test => "test",
    }
}

text_enum! {
    /// Which of the four per-card knowledge lists an item belongs to.
    pub enum KnowledgeItemType / KnowledgeItemTypeParseError ("knowledge item type") {
        Requirement => "requirement",
        Fact => "fact",
        Assumption => "assumption",
        Question => "question",
    }
}

text_enum! {
    /// Review lifecycle of a knowledge item: `draft -> approved | rejected`.
    pub enum KnowledgeStatus / KnowledgeStatusParseError ("knowledge status") {
        Draft => "draft",
        Approved => "approved",
        Rejected => "rejected",
    }
}

text_enum! {
    /// Who produced a knowledge item.
    pub enum KnowledgeSource / KnowledgeSourceParseError ("knowledge source") {
        User => "user",
        Agent => "agent",
        Imported => "imported",
    }
}

text_enum! {
    /// Architectural role of a planned file.
    pub enum PlannedFileKind / PlannedFileKindParseError ("planned file kind") {
        Component => "component",
        Endpoint => "endpoint",
        Service => "service",
        Schema => "schema",
        Hook => "hook",
        Util => "util",
        Middleware => "middleware",
        Job => "job",
        Config => "config",
    }
}

text_enum! {
    /// What the build phase should eventually do with a planned file.
    pub enum PlannedFileAction / PlannedFileActionParseError ("planned file action") {
        Create => "create",
        Modify => "modify",
        Delete => "delete",
    }
}

text_enum! {
    /// Review lifecycle of a planned file: `proposed -> user_edited -> approved`.
    pub enum PlannedFileStatus / PlannedFileStatusParseError ("planned file status") {
        Proposed => "proposed",
        UserEdited => "user_edited",
        Approved => "approved",
    }
}

text_enum! {
    /// Outcome recorded for every attempted planning action.
    pub enum ValidationStatus / ValidationStatusParseError ("validation status") {
        Accepted => "accepted",
        Rejected => "rejected",
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A project -- the root of one planning graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tech_stack: Option<String>,
    pub deployment: Option<String>,
    pub design_inspiration: Option<String>,
    pub repo_url: Option<String>,
    pub default_branch: String,
}

impl Project {
    /// A project with only the required fields set.
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            tech_stack: None,
            deployment: None,
            design_inspiration: None,
            repo_url: None,
            default_branch: "main".to_owned(),
        }
    }
}

/// A user workflow (the top row of a story map).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Workflow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub build_state: Option<String>,
    pub position: i32,
}

/// An activity within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Activity {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub title: String,
    pub color: Option<String>,
    pub position: i32,
}

/// A step column under an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Step {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub title: String,
    pub position: i32,
}

/// A card -- the unit of planned work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Card {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub step_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: CardStatus,
    pub priority: i32,
    pub position: i32,
}

/// Reference material attached to a project and linked to cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ContextArtifact {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub artifact_type: ArtifactType,
    pub title: Option<String>,
    pub content: Option<String>,
    pub uri: Option<String>,
    pub integration_ref: Option<serde_json::Value>,
}

impl ContextArtifact {
    /// An artifact must carry content, a URI, or an integration reference.
    pub fn has_source(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.trim().is_empty())
            || self.uri.as_deref().is_some_and(|u| !u.trim().is_empty())
            || self.integration_ref.as_ref().is_some_and(|r| !r.is_null())
    }
}

/// Join row linking a card to a context artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CardContextLink {
    pub card_id: Uuid,
    pub context_artifact_id: Uuid,
    pub usage_hint: Option<String>,
}

/// A requirement, fact, assumption, or question attached to a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct KnowledgeItem {
    pub id: Uuid,
    pub card_id: Uuid,
    pub item_type: KnowledgeItemType,
    pub text: String,
    pub evidence_source: Option<String>,
    pub confidence: Option<f64>,
    pub status: KnowledgeStatus,
    pub source: KnowledgeSource,
    pub position: i32,
}

/// A file the build phase is expected to touch for a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PlannedFile {
    pub id: Uuid,
    pub card_id: Uuid,
    pub logical_file_name: String,
    pub module_hint: Option<String>,
    pub artifact_kind: PlannedFileKind,
    pub action: PlannedFileAction,
    pub intent_summary: String,
    pub contract_notes: Option<String>,
    pub status: PlannedFileStatus,
    pub position: i32,
}

/// Audit row written for every attempted planning action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ActionRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    /// The action's own id as submitted (may not be a valid UUID when rejected).
    pub action_id: String,
    pub action_type: String,
    pub target_ref: serde_json::Value,
    pub payload: serde_json::Value,
    pub validation_status: ValidationStatus,
    pub rejection_reason: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
