//! Core identifier types shared across the workflow engine.
//!
//! This module defines the two vocabularies every other module speaks:
//!
//! - [`StageKind`]: how stages are identified in graph definitions,
//!   routing decisions, and diagnostics.
//! - [`Field`]: the closed set of [`WorkflowState`](crate::state::WorkflowState)
//!   fields a stage may write, together with each field's [`MergePolicy`].
//!
//! Keeping the field set closed is what lets
//! [`GraphBuilder::compile`](crate::graph::GraphBuilder::compile) prove at
//! definition time that every declared write has a registered reducer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a stage in the workflow graph.
///
/// `Start` and `End` are virtual: they anchor entry and terminal edges but
/// never execute. All real work happens in `Custom` stages registered with
/// [`GraphBuilder::add_stage`](crate::graph::GraphBuilder::add_stage).
///
/// # Examples
///
/// ```
/// use delvegraph::types::StageKind;
///
/// let plan = StageKind::Custom("plan".into());
/// assert!(plan.is_custom());
/// assert_eq!(plan.to_string(), "plan");
/// assert_eq!(StageKind::Start.to_string(), "Start");
/// ```
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageKind {
    /// Virtual entry point. Exactly one edge must leave it.
    Start,
    /// Virtual terminal. Reaching it ends the run.
    End,
    /// A named, user-registered stage.
    Custom(String),
}

impl StageKind {
    /// Stable string encoding used in event payloads and error messages.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            StageKind::Start => "Start".to_string(),
            StageKind::End => "End".to_string(),
            StageKind::Custom(name) => format!("Custom:{name}"),
        }
    }

    /// Inverse of [`encode`](Self::encode).
    #[must_use]
    pub fn decode(encoded: &str) -> Self {
        match encoded {
            "Start" => StageKind::Start,
            "End" => StageKind::End,
            other => {
                let name = other.strip_prefix("Custom:").unwrap_or(other);
                StageKind::Custom(name.to_string())
            }
        }
    }

    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, StageKind::Start)
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, StageKind::End)
    }

    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, StageKind::Custom(_))
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Start => write!(f, "Start"),
            StageKind::End => write!(f, "End"),
            StageKind::Custom(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for StageKind {
    /// `"Start"` and `"End"` name the virtual stages; everything else is a
    /// custom stage name. Same rules as [`decode`](Self::decode).
    fn from(name: &str) -> Self {
        StageKind::decode(name)
    }
}

/// How a field's incoming delta is merged into the existing state value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergePolicy {
    /// Concatenate the incoming sequence onto the existing one, preserving
    /// the incoming order.
    Append,
    /// Incoming value overwrites the existing one.
    Replace,
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::Append => write!(f, "append"),
            MergePolicy::Replace => write!(f, "replace"),
        }
    }
}

/// The closed set of [`WorkflowState`](crate::state::WorkflowState) fields.
///
/// Stages declare which fields they write when registered; the reducer
/// registry must cover every declared field before a graph compiles. The
/// variant order here is the fold order within a single update, which keeps
/// barrier merges a pure function of (state, ordered updates).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Messages,
    Queries,
    Findings,
    Sources,
    Plan,
    Draft,
    Critique,
    Reflection,
    FinalReport,
    Cited,
    Phase,
    RevisionCount,
    LoopCount,
    StartedAt,
}

impl Field {
    /// Every field, in declaration (fold) order.
    pub const ALL: [Field; 14] = [
        Field::Messages,
        Field::Queries,
        Field::Findings,
        Field::Sources,
        Field::Plan,
        Field::Draft,
        Field::Critique,
        Field::Reflection,
        Field::FinalReport,
        Field::Cited,
        Field::Phase,
        Field::RevisionCount,
        Field::LoopCount,
        Field::StartedAt,
    ];

    /// The merge policy the standard registry declares for this field.
    #[must_use]
    pub fn policy(&self) -> MergePolicy {
        match self {
            Field::Messages | Field::Queries | Field::Findings | Field::Sources => {
                MergePolicy::Append
            }
            _ => MergePolicy::Replace,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Messages => "messages",
            Field::Queries => "queries",
            Field::Findings => "findings",
            Field::Sources => "sources",
            Field::Plan => "plan",
            Field::Draft => "draft",
            Field::Critique => "critique",
            Field::Reflection => "reflection",
            Field::FinalReport => "final_report",
            Field::Cited => "cited",
            Field::Phase => "phase",
            Field::RevisionCount => "revision_count",
            Field::LoopCount => "loop_count",
            Field::StartedAt => "started_at",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
