//! Structured events published during a run.
//!
//! Four shapes flow over the bus:
//!
//! - [`StageEvent`]: a stage narrating its own progress.
//! - [`RouteEvent`]: the executor's decision at a conditional edge.
//! - [`LoopEvent`]: a bounded-loop transition carrying the counter value and
//!   the decision taken, so termination is auditable per run.
//! - [`DiagnosticEvent`]: engine-level notices (cancellations, degraded
//!   persistence, run completion).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Scope of the diagnostic emitted when a run's event stream ends.
pub const RUN_END_SCOPE: &str = "__delvegraph_run_end__";

/// Event emitted by a stage while it executes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Stage identity, absent for anonymous emissions.
    pub stage: Option<String>,
    /// Executor step the stage ran at.
    pub step: Option<u64>,
    pub scope: String,
    pub message: String,
}

/// A conditional-edge decision made by the executor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteEvent {
    pub from: String,
    pub target: String,
    pub step: u64,
}

/// A bounded-loop transition.
///
/// One of these is emitted on every revision-controller and search-loop
/// decision; `counter` is the loop counter at decision time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoopEvent {
    pub loop_name: String,
    pub counter: u32,
    pub ceiling: Option<u32>,
    pub decision: String,
}

/// Engine-level notice outside any stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
}

/// Anything that can be published on the [`EventBus`](super::EventBus).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Stage(StageEvent),
    Route(RouteEvent),
    Loop(LoopEvent),
    Diagnostic(DiagnosticEvent),
}

impl Event {
    /// Stage event without identity metadata.
    #[must_use]
    pub fn stage_message(scope: &str, message: &str) -> Self {
        Event::Stage(StageEvent {
            stage: None,
            step: None,
            scope: scope.to_string(),
            message: message.to_string(),
        })
    }

    /// Stage event carrying the emitting stage's identity and step.
    #[must_use]
    pub fn stage_message_with_meta(stage: &str, step: u64, scope: &str, message: &str) -> Self {
        Event::Stage(StageEvent {
            stage: Some(stage.to_string()),
            step: Some(step),
            scope: scope.to_string(),
            message: message.to_string(),
        })
    }

    #[must_use]
    pub fn route(from: &str, target: &str, step: u64) -> Self {
        Event::Route(RouteEvent {
            from: from.to_string(),
            target: target.to_string(),
            step,
        })
    }

    #[must_use]
    pub fn loop_transition(
        loop_name: &str,
        counter: u32,
        ceiling: Option<u32>,
        decision: &str,
    ) -> Self {
        Event::Loop(LoopEvent {
            loop_name: loop_name.to_string(),
            counter,
            ceiling,
            decision: decision.to_string(),
        })
    }

    #[must_use]
    pub fn diagnostic(scope: &str, message: &str) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.to_string(),
            message: message.to_string(),
        })
    }

    /// Short label identifying where the event came from.
    #[must_use]
    pub fn scope_label(&self) -> &str {
        match self {
            Event::Stage(e) => &e.scope,
            Event::Route(_) => "route",
            Event::Loop(e) => &e.loop_name,
            Event::Diagnostic(e) => &e.scope,
        }
    }

    /// Human-oriented payload text.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Event::Stage(e) => e.message.clone(),
            Event::Route(e) => format!("{} -> {}", e.from, e.target),
            Event::Loop(e) => match e.ceiling {
                Some(ceiling) => {
                    format!("{} counter={}/{} -> {}", e.loop_name, e.counter, ceiling, e.decision)
                }
                None => format!("{} counter={} -> {}", e.loop_name, e.counter, e.decision),
            },
            Event::Diagnostic(e) => e.message.clone(),
        }
    }

    /// JSON view with an envelope timestamp, for sinks that ship events out
    /// of process.
    #[must_use]
    pub fn to_json_value(&self) -> Value {
        let stamped = StampedEvent {
            at: Utc::now(),
            event: self,
        };
        serde_json::to_value(&stamped).unwrap_or_else(|_| Value::Null)
    }

    #[must_use]
    pub fn to_json_string(&self) -> String {
        self.to_json_value().to_string()
    }
}

#[derive(Serialize)]
struct StampedEvent<'a> {
    at: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a Event,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Stage(e) => {
                if let (Some(stage), Some(step)) = (&e.stage, e.step) {
                    write!(f, "[stage {stage}#{step}] {}: {}", e.scope, e.message)
                } else {
                    write!(f, "[stage] {}: {}", e.scope, e.message)
                }
            }
            Event::Route(e) => write!(f, "[route#{}] {} -> {}", e.step, e.from, e.target),
            Event::Loop(_) => write!(f, "[loop] {}", self.message()),
            Event::Diagnostic(e) => write!(f, "[diag] {}: {}", e.scope, e.message),
        }
    }
}
