use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::instrument;

use crate::event_bus::{Event, EventBus, EventEmitter, RUN_END_SCOPE};
use crate::reducers::ReducerError;
use crate::revision::CeilingViolation;
use crate::stage::{Capabilities, StageContext, StageError};
use crate::state::WorkflowState;
use crate::types::StageKind;
use crate::workflow::Workflow;

use super::dispatch::{DispatchError, Dispatcher};
use super::RunConfig;

#[derive(Debug, Error, Diagnostic)]
pub enum ExecutorError {
    #[error("stage `{stage}` is wired into the walk but not registered")]
    #[diagnostic(code(delvegraph::runner::unknown_stage))]
    UnknownStage { stage: String },

    #[error("router at `{from}` chose `{target}`, which is not a declared successor")]
    #[diagnostic(
        code(delvegraph::runner::unknown_target),
        help("declare the target in add_conditional_edge, or fix the router")
    )]
    UnknownTarget { from: String, target: String },

    #[error("stage `{stage}` failed at step {step}")]
    #[diagnostic(code(delvegraph::runner::stage))]
    StageRun {
        stage: String,
        step: u64,
        #[source]
        source: StageError,
    },

    /// A bounded loop ran past its ceiling. Never recovered: both the stage
    /// clamp and the router bound had to fail for this to surface.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Ceiling(#[from] CeilingViolation),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Barrier(#[from] ReducerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("workflow task join error")]
    #[diagnostic(code(delvegraph::runner::join))]
    Join(#[from] JoinError),
}

impl ExecutorError {
    /// Whether this failure came from cancellation rather than a fault.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ExecutorError::Dispatch(DispatchError::Cancelled))
    }
}

/// What a completed walk hands back to the caller.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// State after the last folded barrier.
    pub state: WorkflowState,
    /// Number of stage invocations the walk performed.
    pub steps: u64,
    /// Set when the run stopped on a cancellation signal rather than by
    /// reaching a terminal stage.
    pub cancelled: bool,
}

/// Handle to a spawned run: cancel it, then await its report.
pub struct RunHandle {
    cancel: watch::Sender<bool>,
    join: JoinHandle<Result<RunReport, ExecutorError>>,
}

impl RunHandle {
    /// Signal cancellation. In-flight fan-out tasks are aborted; deltas
    /// from tasks that already finished are still folded.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub async fn join(self) -> Result<RunReport, ExecutorError> {
        self.join.await?
    }
}

/// Drives a compiled [`Workflow`] from its entry stage to a terminal one.
///
/// The runner owns the run-scoped pieces: collaborator capabilities, the
/// run configuration handed to routers and planners, and the event bus the
/// stages publish on. One workflow can back many runners.
pub struct WorkflowRunner {
    workflow: Arc<Workflow>,
    caps: Capabilities,
    config: Arc<RunConfig>,
    event_bus: Arc<EventBus>,
}

impl WorkflowRunner {
    pub fn new(workflow: Arc<Workflow>, caps: Capabilities) -> Self {
        Self {
            workflow,
            caps,
            config: Arc::new(RunConfig::default()),
            event_bus: Arc::new(EventBus::default()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Arc::new(event_bus);
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn config(&self) -> &Arc<RunConfig> {
        &self.config
    }

    /// Run to completion without external cancellation.
    pub async fn run(&self, initial: WorkflowState) -> Result<RunReport, ExecutorError> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let report = self.run_with_cancel(initial, cancel_rx).await;
        drop(cancel_tx);
        report
    }

    /// Spawn the run on the current tokio runtime, returning a handle that
    /// can cancel it.
    pub fn spawn(self: Arc<Self>, initial: WorkflowState) -> RunHandle {
        let (cancel, cancel_rx) = watch::channel(false);
        let runner = Arc::clone(&self);
        let join = tokio::spawn(async move { runner.run_with_cancel(initial, cancel_rx).await });
        RunHandle { cancel, join }
    }

    #[instrument(skip(self, initial, cancel), err)]
    pub async fn run_with_cancel(
        &self,
        initial: WorkflowState,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RunReport, ExecutorError> {
        self.event_bus.start_listener();
        let emitter = self.event_bus.get_emitter();

        let result = self.walk(initial, &mut cancel, &emitter).await;
        let marker = match &result {
            Ok(report) if report.cancelled => {
                format!("cancelled after step {}", report.steps)
            }
            Ok(report) => format!("completed after step {}", report.steps),
            Err(error) => format!("failed: {error}"),
        };
        let _ = emitter.emit(Event::diagnostic(RUN_END_SCOPE, &marker));
        result
    }

    async fn walk(
        &self,
        initial: WorkflowState,
        cancel: &mut watch::Receiver<bool>,
        emitter: &crate::event_bus::BusEmitter,
    ) -> Result<RunReport, ExecutorError> {
        let dispatcher = Dispatcher::new(self.config.task_concurrency);
        let mut state = initial;
        let mut current = self.workflow.entry().clone();
        let mut step: u64 = 0;

        loop {
            if *cancel.borrow() {
                tracing::warn!(step, stage = %current, "run cancelled between stages");
                return Ok(RunReport {
                    state,
                    steps: step,
                    cancelled: true,
                });
            }
            if current.is_end() {
                break;
            }
            let Some(descriptor) = self.workflow.descriptor(&current) else {
                return Err(ExecutorError::UnknownStage {
                    stage: current.to_string(),
                });
            };
            step += 1;

            let snapshot = state.snapshot();
            let ctx = StageContext {
                stage_id: current.to_string(),
                step,
                task: None,
                config: Arc::clone(&self.config),
                caps: self.caps.clone(),
                event_emitter: emitter.clone(),
            };
            let stage_span = tracing::info_span!("stage", step, stage = %current);
            let update = stage_span
                .in_scope(|| descriptor.stage.run(snapshot, ctx))
                .await
                .map_err(|source| match source {
                    StageError::Ceiling(violation) => ExecutorError::Ceiling(violation),
                    other => ExecutorError::StageRun {
                        stage: current.to_string(),
                        step,
                        source: other,
                    },
                })?;

            for field in update.written_fields() {
                if !descriptor.declares(field) {
                    tracing::warn!(
                        stage = %current,
                        field = %field,
                        "stage wrote a field outside its declared set"
                    );
                }
            }

            let barrier_span = tracing::info_span!("barrier", step, updates = 1usize);
            barrier_span.in_scope(|| self.workflow.fold_updates(&mut state, &[update]))?;

            let snapshot = state.snapshot();
            if let Some(edge) = self.workflow.conditional_edge(&current) {
                let chosen = edge.route(&snapshot, &self.config);
                if !edge.permits(&chosen) {
                    return Err(ExecutorError::UnknownTarget {
                        from: current.to_string(),
                        target: chosen,
                    });
                }
                let target = StageKind::decode(&chosen);
                tracing::debug!(step, from = %current, target = %target, "conditional route");
                let _ = emitter.emit(Event::route(&current.to_string(), &chosen, step));
                current = target;
            } else if let Some(edge) = self.workflow.fanout_edge(&current) {
                let seeds = edge.plan(&snapshot, &self.config);
                let fanout_span =
                    tracing::info_span!("fanout", step, from = %current, tasks = seeds.len());
                let outcome = fanout_span
                    .in_scope(|| {
                        dispatcher.run_batch(
                            &self.workflow,
                            seeds,
                            &snapshot,
                            step,
                            &self.caps,
                            &self.config,
                            emitter,
                            cancel,
                        )
                    })
                    .await?;

                let barrier_span =
                    tracing::info_span!("barrier", step, updates = outcome.updates.len());
                barrier_span.in_scope(|| self.workflow.fold_updates(&mut state, &outcome.updates))?;

                if outcome.cancelled {
                    return Ok(RunReport {
                        state,
                        steps: step,
                        cancelled: true,
                    });
                }
                let join = edge.join_stage().clone();
                let _ = emitter.emit(Event::route(
                    &current.to_string(),
                    &join.to_string(),
                    step,
                ));
                current = join;
            } else if let Some(next) = self.workflow.next_unconditional(&current) {
                let _ = emitter.emit(Event::route(
                    &current.to_string(),
                    &next.to_string(),
                    step,
                ));
                current = next.clone();
            } else {
                // A stage with no outgoing route is the terminal stage.
                tracing::debug!(step, stage = %current, "terminal stage reached");
                break;
            }
        }

        Ok(RunReport {
            state,
            steps: step,
            cancelled: false,
        })
    }
}
