//! Workflow state: the single record threaded through every stage of a run.
//!
//! # Design
//!
//! [`WorkflowState`] has a closed field set (one slot per [`Field`]
//! variant). Stages never mutate it directly; they return a
//! [`StageUpdate`](crate::stage::StageUpdate) delta that the engine folds in
//! through the [`ReducerRegistry`](crate::reducers::ReducerRegistry). The
//! state lives in exactly one place at a time (the executor's current value),
//! so no locking is involved anywhere in a run.
//!
//! Stages read a [`StateSnapshot`], an owned copy taken before each stage or
//! fan-out executes. Concurrent tasks each receive their own snapshot and can
//! never observe a sibling's output.
//!
//! # Construction
//!
//! ```
//! use delvegraph::state::WorkflowState;
//!
//! let state = WorkflowState::new_with_query("history of the borrow checker");
//! assert_eq!(state.snapshot().messages.len(), 1);
//!
//! let staged = WorkflowState::builder()
//!     .with_query("rust async runtimes compared")
//!     .with_started_at(chrono::Utc::now())
//!     .build();
//! assert!(staged.started_at.is_some());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::Message;

/// Coarse run-phase label, replaced as the run advances.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Planning,
    Researching,
    Synthesizing,
    Critiquing,
    Revising,
    Finalizing,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Planning => "planning",
            Phase::Researching => "researching",
            Phase::Synthesizing => "synthesizing",
            Phase::Critiquing => "critiquing",
            Phase::Revising => "revising",
            Phase::Finalizing => "finalizing",
            Phase::Complete => "complete",
        };
        write!(f, "{label}")
    }
}

/// One researched text block contributed by a task or stage.
///
/// `seq` is the correlation key assigned when the task was seeded; it ties the
/// finding to the citation markers minted for the same unit of work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub topic: String,
    pub seq: u32,
    pub body: String,
}

impl Finding {
    #[must_use]
    pub fn new(topic: &str, seq: u32, body: &str) -> Self {
        Self {
            topic: topic.to_string(),
            seq,
            body: body.to_string(),
        }
    }
}

/// A gathered source reference.
///
/// `marker` is the short citation token that may appear literally in draft
/// text; `url` is the canonical value every occurrence of the marker is
/// rewritten to at finalization. See [`citations`](crate::citations).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub marker: String,
    pub url: String,
    pub label: String,
}

impl SourceRef {
    #[must_use]
    pub fn new(marker: &str, url: &str, label: &str) -> Self {
        Self {
            marker: marker.to_string(),
            url: url.to_string(),
            label: label.to_string(),
        }
    }
}

/// One research sub-topic with its search queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTopic {
    pub name: String,
    pub queries: Vec<String>,
}

/// Structured decomposition of the research question, produced by the
/// planning stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub question: String,
    pub topics: Vec<SubTopic>,
    /// Free-form depth estimate ("focused", "broad", ...). Informational only.
    pub depth: String,
}

impl ResearchPlan {
    /// Minimal single-topic plan used when structured planning output cannot
    /// be obtained. Keeps the run viable instead of failing it.
    #[must_use]
    pub fn fallback(question: &str) -> Self {
        Self {
            question: question.to_string(),
            topics: vec![SubTopic {
                name: question.to_string(),
                queries: vec![question.to_string()],
            }],
            depth: "focused".to_string(),
        }
    }
}

/// Structured critique of the current draft.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub assessment: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
    /// Effective revision verdict. Already ceiling-clamped by the critique
    /// stage; the router re-checks the ceiling independently.
    pub should_revise: bool,
}

impl Critique {
    /// Non-revising assessment used when the critique call fails; the run
    /// proceeds to finalization rather than aborting.
    #[must_use]
    pub fn fallback(note: &str) -> Self {
        Self {
            assessment: format!("assessment unavailable: {note}"),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            suggestions: Vec::new(),
            should_revise: false,
        }
    }
}

/// Sufficiency verdict for the bounded search loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
    pub is_sufficient: bool,
    pub knowledge_gap: String,
    pub follow_up_queries: Vec<String>,
}

impl Reflection {
    /// Loop-closing verdict used when the reflection call fails.
    #[must_use]
    pub fn sufficient(note: &str) -> Self {
        Self {
            is_sufficient: true,
            knowledge_gap: note.to_string(),
            follow_up_queries: Vec::new(),
        }
    }
}

/// The accumulating record of one run.
///
/// Sequence fields (`messages`, `queries`, `findings`, `sources`) only ever
/// grow; scalar fields hold the latest written value. Field-by-field merge
/// semantics are declared in [`Field::policy`](crate::types::Field::policy)
/// and enforced by the standard reducer registry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub messages: Vec<Message>,
    pub queries: Vec<String>,
    pub findings: Vec<Finding>,
    pub sources: Vec<SourceRef>,
    pub plan: Option<ResearchPlan>,
    pub draft: Option<String>,
    pub critique: Option<Critique>,
    pub reflection: Option<Reflection>,
    pub final_report: Option<String>,
    pub cited: Vec<SourceRef>,
    pub phase: Phase,
    pub revision_count: u32,
    pub loop_count: u32,
    pub started_at: Option<DateTime<Utc>>,
}

impl WorkflowState {
    /// State seeded with the research question as the first user message.
    #[must_use]
    pub fn new_with_query(query: &str) -> Self {
        Self {
            messages: vec![Message::user(query)],
            ..Self::default()
        }
    }

    /// Fluent construction for anything beyond the single-query case.
    #[must_use]
    pub fn builder() -> WorkflowStateBuilder {
        WorkflowStateBuilder::default()
    }

    /// Owned read view handed to stages and fan-out tasks.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            messages: self.messages.clone(),
            queries: self.queries.clone(),
            findings: self.findings.clone(),
            sources: self.sources.clone(),
            plan: self.plan.clone(),
            draft: self.draft.clone(),
            critique: self.critique.clone(),
            reflection: self.reflection.clone(),
            final_report: self.final_report.clone(),
            cited: self.cited.clone(),
            phase: self.phase,
            revision_count: self.revision_count,
            loop_count: self.loop_count,
            started_at: self.started_at,
        }
    }
}

/// Owned, immutable view of [`WorkflowState`] at a point in time.
///
/// Every stage invocation and every fan-out task gets its own snapshot;
/// mutating it affects nothing outside the stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub messages: Vec<Message>,
    pub queries: Vec<String>,
    pub findings: Vec<Finding>,
    pub sources: Vec<SourceRef>,
    pub plan: Option<ResearchPlan>,
    pub draft: Option<String>,
    pub critique: Option<Critique>,
    pub reflection: Option<Reflection>,
    pub final_report: Option<String>,
    pub cited: Vec<SourceRef>,
    pub phase: Phase,
    pub revision_count: u32,
    pub loop_count: u32,
    pub started_at: Option<DateTime<Utc>>,
}

impl StateSnapshot {
    /// Content of the most recent user message, usually the research
    /// question that started the run.
    #[must_use]
    pub fn latest_user_query(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.has_role(Message::USER))
            .map(|m| m.content.as_str())
    }

    /// The draft to critique or revise, if one has been produced.
    #[must_use]
    pub fn current_draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }
}

/// Builder for [`WorkflowState`].
#[derive(Debug, Default)]
pub struct WorkflowStateBuilder {
    state: WorkflowState,
}

impl WorkflowStateBuilder {
    /// Appends the research question as a user message.
    #[must_use]
    pub fn with_query(mut self, query: &str) -> Self {
        self.state.messages.push(Message::user(query));
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.state.messages.push(message);
        self
    }

    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.state.phase = phase;
        self
    }

    /// Stamps the run start; leaving it unset is valid and simply yields no
    /// duration downstream.
    #[must_use]
    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.state.started_at = Some(at);
        self
    }

    #[must_use]
    pub fn build(self) -> WorkflowState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_with_query_seeds_user_message() {
        let state = WorkflowState::new_with_query("why is the sky blue");
        assert_eq!(state.messages.len(), 1);
        assert_eq!(
            state.snapshot().latest_user_query(),
            Some("why is the sky blue")
        );
    }

    #[test]
    fn snapshot_is_detached_from_state() {
        let mut state = WorkflowState::new_with_query("q");
        let snapshot = state.snapshot();
        state.messages.push(Message::assistant("later"));
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(state.messages.len(), 2);
    }

    #[test]
    fn builder_sets_optional_start_time() {
        let now = Utc::now();
        let state = WorkflowState::builder()
            .with_query("q")
            .with_started_at(now)
            .build();
        assert_eq!(state.started_at, Some(now));

        let bare = WorkflowState::new_with_query("q");
        assert!(bare.started_at.is_none());
    }

    #[test]
    fn fallback_plan_covers_the_question() {
        let plan = ResearchPlan::fallback("what is wasm");
        assert_eq!(plan.topics.len(), 1);
        assert_eq!(plan.topics[0].queries, vec!["what is wasm".to_string()]);
    }

    #[test]
    fn latest_user_query_skips_assistant_messages() {
        let state = WorkflowState::builder()
            .with_query("first")
            .with_message(Message::assistant("noise"))
            .build();
        assert_eq!(state.snapshot().latest_user_query(), Some("first"));
    }
}
