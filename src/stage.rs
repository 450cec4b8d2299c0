//! Stage abstraction: the unit of work the graph executor schedules.
//!
//! A [`Stage`] is an async function from a [`StateSnapshot`] and a
//! [`StageContext`] to a [`StageUpdate`] delta. Stages own no state and
//! mutate nothing; the engine folds their deltas into
//! [`WorkflowState`](crate::state::WorkflowState) through the reducer
//! registry. Routing never happens inside a stage: conditional and fan-out
//! decisions live on edges as pure functions.
//!
//! # Implementing a stage
//!
//! ```
//! use async_trait::async_trait;
//! use delvegraph::stage::{Stage, StageContext, StageError, StageUpdate};
//! use delvegraph::state::{Phase, StateSnapshot};
//!
//! struct MarkResearching;
//!
//! #[async_trait]
//! impl Stage for MarkResearching {
//!     async fn run(
//!         &self,
//!         _snapshot: StateSnapshot,
//!         ctx: StageContext,
//!     ) -> Result<StageUpdate, StageError> {
//!         ctx.emit("progress", "entering research phase")?;
//!         Ok(StageUpdate::default().with_phase(Phase::Researching))
//!     }
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::event_bus::{BusEmitter, EmitError, Event, EventEmitter};
use crate::message::Message;
use crate::records::RecordStore;
use crate::revision::CeilingViolation;
use crate::runtime::RunConfig;
use crate::service::{GenerationService, ServiceError};
use crate::state::{
    Critique, Finding, Phase, Reflection, ResearchPlan, SourceRef, StateSnapshot,
};
use crate::types::Field;

/// Collaborators injected into every stage invocation.
///
/// Held behind `Arc`s so fan-out tasks share the same instances; tests swap
/// in fakes without touching process globals.
#[derive(Clone)]
pub struct Capabilities {
    pub generator: Arc<dyn GenerationService>,
    pub records: Arc<dyn RecordStore>,
}

impl Capabilities {
    #[must_use]
    pub fn new(generator: Arc<dyn GenerationService>, records: Arc<dyn RecordStore>) -> Self {
        Self { generator, records }
    }
}

/// Identity and parameters of one fan-out task.
///
/// `ordinal` is the task's position in the planner's seed list: stable for
/// the lifetime of the join and the key the barrier folds by. `params` is
/// the planner-provided sub-state payload, decoded by the target stage via
/// [`StageContext::task_params`].
#[derive(Clone, Debug, PartialEq)]
pub struct TaskAssignment {
    pub ordinal: u32,
    pub params: Value,
}

/// Per-invocation context handed to a stage.
#[derive(Clone)]
pub struct StageContext {
    /// Display name of the executing stage.
    pub stage_id: String,
    /// Executor step counter at invocation time.
    pub step: u64,
    /// Present only when the stage runs as a fan-out task.
    pub task: Option<TaskAssignment>,
    pub config: Arc<RunConfig>,
    pub caps: Capabilities,
    pub event_emitter: BusEmitter,
}

impl StageContext {
    /// Publishes a stage event tagged with this stage's identity and step.
    pub fn emit(&self, scope: &str, message: &str) -> Result<(), EmitError> {
        self.event_emitter.emit(Event::stage_message_with_meta(
            &self.stage_id,
            self.step,
            scope,
            message,
        ))
    }

    /// Publishes an arbitrary event (loop transitions, diagnostics).
    pub fn emit_event(&self, event: Event) -> Result<(), EmitError> {
        self.event_emitter.emit(event)
    }

    #[must_use]
    pub fn generator(&self) -> &Arc<dyn GenerationService> {
        &self.caps.generator
    }

    #[must_use]
    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.caps.records
    }

    /// Ordinal id of the current task, if this invocation is a fan-out task.
    #[must_use]
    pub fn task_ordinal(&self) -> Option<u32> {
        self.task.as_ref().map(|t| t.ordinal)
    }

    /// Decodes the task params into the stage's expected shape.
    ///
    /// Fails with [`StageError::MissingInput`] outside a fan-out task and
    /// with [`StageError::Serde`] on a malformed payload.
    pub fn task_params<T: DeserializeOwned>(&self) -> Result<T, StageError> {
        let task = self.task.as_ref().ok_or(StageError::MissingInput {
            what: "task assignment",
        })?;
        Ok(serde_json::from_value(task.params.clone())?)
    }
}

/// Delta returned by a stage: one optional slot per state field.
///
/// `None` means "not written". Sequence slots append, scalar slots replace,
/// per the field's declared policy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StageUpdate {
    pub messages: Option<Vec<Message>>,
    pub queries: Option<Vec<String>>,
    pub findings: Option<Vec<Finding>>,
    pub sources: Option<Vec<SourceRef>>,
    pub plan: Option<ResearchPlan>,
    pub draft: Option<String>,
    pub critique: Option<Critique>,
    pub reflection: Option<Reflection>,
    pub final_report: Option<String>,
    pub cited: Option<Vec<SourceRef>>,
    pub phase: Option<Phase>,
    pub revision_count: Option<u32>,
    pub loop_count: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
}

impl StageUpdate {
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    #[must_use]
    pub fn with_message(self, message: Message) -> Self {
        self.with_messages(vec![message])
    }

    #[must_use]
    pub fn with_queries(mut self, queries: Vec<String>) -> Self {
        self.queries = Some(queries);
        self
    }

    #[must_use]
    pub fn with_findings(mut self, findings: Vec<Finding>) -> Self {
        self.findings = Some(findings);
        self
    }

    #[must_use]
    pub fn with_sources(mut self, sources: Vec<SourceRef>) -> Self {
        self.sources = Some(sources);
        self
    }

    #[must_use]
    pub fn with_plan(mut self, plan: ResearchPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    #[must_use]
    pub fn with_draft(mut self, draft: impl Into<String>) -> Self {
        self.draft = Some(draft.into());
        self
    }

    #[must_use]
    pub fn with_critique(mut self, critique: Critique) -> Self {
        self.critique = Some(critique);
        self
    }

    #[must_use]
    pub fn with_reflection(mut self, reflection: Reflection) -> Self {
        self.reflection = Some(reflection);
        self
    }

    #[must_use]
    pub fn with_final_report(mut self, report: impl Into<String>) -> Self {
        self.final_report = Some(report.into());
        self
    }

    #[must_use]
    pub fn with_cited(mut self, cited: Vec<SourceRef>) -> Self {
        self.cited = Some(cited);
        self
    }

    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    #[must_use]
    pub fn with_revision_count(mut self, count: u32) -> Self {
        self.revision_count = Some(count);
        self
    }

    #[must_use]
    pub fn with_loop_count(mut self, count: u32) -> Self {
        self.loop_count = Some(count);
        self
    }

    #[must_use]
    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    /// Which fields this update writes, in declaration order.
    #[must_use]
    pub fn written_fields(&self) -> Vec<Field> {
        let mut written = Vec::new();
        for field in Field::ALL {
            let wrote = match field {
                Field::Messages => self.messages.is_some(),
                Field::Queries => self.queries.is_some(),
                Field::Findings => self.findings.is_some(),
                Field::Sources => self.sources.is_some(),
                Field::Plan => self.plan.is_some(),
                Field::Draft => self.draft.is_some(),
                Field::Critique => self.critique.is_some(),
                Field::Reflection => self.reflection.is_some(),
                Field::FinalReport => self.final_report.is_some(),
                Field::Cited => self.cited.is_some(),
                Field::Phase => self.phase.is_some(),
                Field::RevisionCount => self.revision_count.is_some(),
                Field::LoopCount => self.loop_count.is_some(),
                Field::StartedAt => self.started_at.is_some(),
            };
            if wrote {
                written.push(field);
            }
        }
        written
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written_fields().is_empty()
    }
}

/// Failures a stage can surface to the executor.
///
/// Collaborator trouble (`Service`) normally never reaches the executor:
/// pipeline stages degrade locally to fallback values. What does propagate
/// is fatal: missing inputs, invariant violations, malformed task params.
#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    #[error("missing input: {what}")]
    #[diagnostic(
        code(delvegraph::stage::missing_input),
        help("the stage ran before the field it depends on was written")
    )]
    MissingInput { what: &'static str },

    #[error("generation service failure in stage")]
    #[diagnostic(code(delvegraph::stage::service))]
    Service(#[from] ServiceError),

    #[error("stage payload could not be decoded")]
    #[diagnostic(code(delvegraph::stage::serde))]
    Serde(#[from] serde_json::Error),

    #[error("stage validation failed: {0}")]
    #[diagnostic(code(delvegraph::stage::validation))]
    ValidationFailed(String),

    /// A bounded-loop counter exceeded its ceiling. Always fatal.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Ceiling(#[from] CeilingViolation),

    #[error("stage could not publish an event")]
    #[diagnostic(code(delvegraph::stage::event_bus))]
    Event(#[from] EmitError),
}

/// The unit of work the executor schedules.
///
/// Implementations must be `Send + Sync`: fan-out runs many invocations of
/// the same stage concurrently, each with its own snapshot and context.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn run(&self, snapshot: StateSnapshot, ctx: StageContext)
    -> Result<StageUpdate, StageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_fields_follow_declaration_order() {
        let update = StageUpdate::default()
            .with_phase(Phase::Researching)
            .with_queries(vec!["q".into()])
            .with_draft("d");
        assert_eq!(
            update.written_fields(),
            vec![Field::Queries, Field::Draft, Field::Phase]
        );
    }

    #[test]
    fn empty_update_writes_nothing() {
        assert!(StageUpdate::default().is_empty());
        assert!(
            !StageUpdate::default()
                .with_loop_count(1)
                .is_empty()
        );
    }
}
