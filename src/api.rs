//! Run submission: the crate's front door.
//!
//! [`submit`] takes a [`RunRequest`], builds the requested workflow preset,
//! drives it to completion and returns a [`RunOutcome`]: the final report
//! plus the deduplicated sources actually cited in it. The completed run is
//! appended to the record store best-effort; persistence trouble is downgraded
//! to a diagnostic and a missing `record_id`, never to a failed submission.

use std::sync::Arc;

use chrono::Utc;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event_bus::{Event, EventEmitter};
use crate::graph::GraphCompileError;
use crate::pipeline;
use crate::records::{RecordId, RunRecord};
use crate::runtime::{EffortLevel, ExecutorError, RunConfig, WorkflowRunner};
use crate::stage::Capabilities;
use crate::state::{SourceRef, WorkflowState};

/// How many of the run's queries a stored record keeps.
const RECORDED_QUERY_LIMIT: usize = 10;

/// Which shipped workflow preset a submission runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    #[default]
    Deep,
    Discovery,
}

/// Optional knobs on a submission.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    /// Effort preset; picks the initial query count and search-pass budget.
    #[serde(default)]
    pub effort: Option<EffortLevel>,
    /// Overrides the effort preset's search-pass budget.
    #[serde(default)]
    pub max_search_passes: Option<u32>,
    /// Model label forwarded to the generation service.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub preset: Preset,
}

/// One research submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub query: String,
    #[serde(default)]
    pub params: RunParams,
}

impl RunRequest {
    #[must_use]
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            params: RunParams::default(),
        }
    }

    #[must_use]
    pub fn with_effort(mut self, effort: EffortLevel) -> Self {
        self.params.effort = Some(effort);
        self
    }

    #[must_use]
    pub fn with_max_search_passes(mut self, max_search_passes: u32) -> Self {
        self.params.max_search_passes = Some(max_search_passes);
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        self.params.model = Some(model.to_string());
        self
    }

    #[must_use]
    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.params.preset = preset;
        self
    }

    /// Resolved run configuration: effort presets plus explicit overrides.
    #[must_use]
    pub fn config(&self) -> RunConfig {
        let mut config = self
            .params
            .effort
            .map(RunConfig::for_effort)
            .unwrap_or_default();
        if let Some(max_search_passes) = self.params.max_search_passes {
            config = config.with_max_search_passes(max_search_passes);
        }
        if let Some(model) = &self.params.model {
            config = config.with_model(model.clone());
        }
        config
    }
}

/// What a completed submission hands back.
#[derive(Clone, Debug, Serialize)]
pub struct RunOutcome {
    /// Final report text, citation markers already rewritten.
    pub report: String,
    /// Deduplicated sources whose markers appear in the report.
    pub cited: Vec<SourceRef>,
    /// Wall-clock duration, when the run carried a start timestamp.
    pub duration_ms: Option<u64>,
    /// Id of the stored run record; `None` when persistence failed.
    pub record_id: Option<RecordId>,
}

/// Ways a submission can fail. Persistence trouble is deliberately absent.
#[derive(Debug, Error, Diagnostic)]
pub enum SubmitError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Definition(#[from] GraphCompileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Run(#[from] ExecutorError),
}

/// Runs one submission end to end.
pub async fn submit(request: RunRequest, caps: Capabilities) -> Result<RunOutcome, SubmitError> {
    let config = request.config();
    let builder = match request.params.preset {
        Preset::Deep => pipeline::deep_research_graph(),
        Preset::Discovery => pipeline::discovery_graph(),
    };
    let workflow = Arc::new(builder.compile()?);
    let runner = WorkflowRunner::new(workflow, caps.clone()).with_config(config.clone());

    let initial = WorkflowState::builder()
        .with_query(&request.query)
        .with_started_at(Utc::now())
        .build();
    let report = runner.run(initial).await?;
    let state = report.state;

    let text = state.final_report.clone().unwrap_or_default();
    let duration_ms = state
        .started_at
        .and_then(|at| (Utc::now() - at).to_std().ok())
        .map(|elapsed| elapsed.as_millis() as u64);

    let record = RunRecord::new(&request.query, &text)
        .with_effort(config.effort.as_str())
        .with_model(config.model.clone())
        .with_queries(
            state
                .queries
                .iter()
                .take(RECORDED_QUERY_LIMIT)
                .cloned()
                .collect(),
        )
        .with_source_count(state.sources.len())
        .with_duration_ms(duration_ms);
    let record_id = match caps.records.append(record).await {
        Ok(id) => Some(id),
        Err(error) => {
            tracing::warn!(%error, "run record could not be stored");
            let _ = runner
                .event_bus()
                .get_emitter()
                .emit(Event::diagnostic("records", &format!("append failed: {error}")));
            None
        }
    };

    Ok(RunOutcome {
        report: text,
        cited: state.cited,
        duration_ms,
        record_id,
    })
}
