//! Fan-out dispatch and the join barrier's collection half.
//!
//! The dispatcher turns a planner's seed list into concurrent tasks, one
//! per seed, each holding an ordinal id equal to its position in the list.
//! Results are collected into ordinal-indexed slots, so the batch the
//! runner folds is ordered by task id no matter how completion interleaves.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use crate::event_bus::BusEmitter;
use crate::graph::TaskSeed;
use crate::stage::{Capabilities, StageContext, StageError, StageUpdate, TaskAssignment};
use crate::state::StateSnapshot;
use crate::workflow::Workflow;

use super::RunConfig;

#[derive(Debug, Error, Diagnostic)]
pub enum DispatchError {
    #[error("fan-out seed {ordinal} targets `{target}`, which is not registered")]
    #[diagnostic(
        code(delvegraph::dispatch::unknown_seed_target),
        help("planners may only name stages registered with add_stage")
    )]
    UnknownSeedTarget { ordinal: u32, target: String },

    #[error("task {ordinal} in stage `{stage}` failed")]
    #[diagnostic(code(delvegraph::dispatch::task))]
    Task {
        ordinal: u32,
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("fan-out task panicked")]
    #[diagnostic(code(delvegraph::dispatch::join))]
    Join(#[from] JoinError),

    #[error("run cancelled before any fan-out task completed")]
    #[diagnostic(code(delvegraph::dispatch::cancelled))]
    Cancelled,
}

/// What one fan-out produced, in task ordinal order.
///
/// `cancelled` is set when the batch was cut short by a cancellation
/// signal; `updates` then holds only the deltas of tasks that had already
/// finished.
pub struct BatchOutcome {
    pub updates: Vec<StageUpdate>,
    pub cancelled: bool,
}

/// Runs one fan-out batch to completion (or cancellation).
pub struct Dispatcher {
    concurrency: Option<usize>,
}

impl Dispatcher {
    pub fn new(concurrency: Option<usize>) -> Self {
        Self { concurrency }
    }

    /// Spawn one task per seed and wait for the batch.
    ///
    /// Every seed target is checked against the workflow before anything
    /// spawns; an unknown target fails the whole batch without side
    /// effects. A task failure aborts the remaining tasks. On
    /// cancellation, tasks that already finished keep their slots and the
    /// rest are aborted; a batch with zero finished tasks fails with
    /// [`DispatchError::Cancelled`].
    pub async fn run_batch(
        &self,
        workflow: &Workflow,
        seeds: Vec<TaskSeed>,
        snapshot: &StateSnapshot,
        step: u64,
        caps: &Capabilities,
        config: &Arc<RunConfig>,
        emitter: &BusEmitter,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<BatchOutcome, DispatchError> {
        for (ordinal, seed) in seeds.iter().enumerate() {
            if workflow.descriptor(&seed.target).is_none() {
                return Err(DispatchError::UnknownSeedTarget {
                    ordinal: ordinal as u32,
                    target: seed.target.to_string(),
                });
            }
        }
        if seeds.is_empty() {
            debug!(step, "fan-out produced zero tasks, skipping to join");
            return Ok(BatchOutcome {
                updates: Vec::new(),
                cancelled: false,
            });
        }

        let semaphore = self
            .concurrency
            .map(|cap| Arc::new(Semaphore::new(cap.max(1))));
        let mut join_set: JoinSet<(u32, String, Result<StageUpdate, StageError>)> = JoinSet::new();
        let task_count = seeds.len();

        for (index, seed) in seeds.into_iter().enumerate() {
            let ordinal = index as u32;
            let stage_id = seed.target.to_string();
            // Targets were validated before anything spawned.
            let Some(descriptor) = workflow.descriptor(&seed.target) else {
                continue;
            };
            let stage = Arc::clone(&descriptor.stage);
            let ctx = StageContext {
                stage_id: stage_id.clone(),
                step,
                task: Some(TaskAssignment {
                    ordinal,
                    params: seed.params,
                }),
                config: Arc::clone(config),
                caps: caps.clone(),
                event_emitter: emitter.clone(),
            };
            let task_snapshot = snapshot.clone();
            let permit_source = semaphore.clone();

            join_set.spawn(async move {
                if let Some(semaphore) = permit_source {
                    // Closed only if the semaphore were dropped, which the
                    // batch keeps alive; treat as an immediate go-ahead.
                    if let Ok(permit) = semaphore.acquire().await {
                        let result = stage.run(task_snapshot, ctx).await;
                        drop(permit);
                        return (ordinal, stage_id, result);
                    }
                }
                (ordinal, stage_id, stage.run(task_snapshot, ctx).await)
            });
        }

        let mut slots: Vec<Option<StageUpdate>> = vec![None; task_count];
        let mut cancelled = false;
        let mut cancel_live = true;

        loop {
            tokio::select! {
                changed = cancel.changed(), if cancel_live && !cancelled => {
                    match changed {
                        Ok(()) => {
                            if *cancel.borrow() {
                                warn!(step, "cancellation received, aborting in-flight tasks");
                                cancelled = true;
                                join_set.abort_all();
                            }
                        }
                        Err(_) => cancel_live = false,
                    }
                }
                joined = join_set.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok((ordinal, _, Ok(update)))) => {
                            debug!(step, ordinal, "task completed");
                            slots[ordinal as usize] = Some(update);
                        }
                        Some(Ok((ordinal, stage, Err(source)))) => {
                            join_set.abort_all();
                            return Err(DispatchError::Task { ordinal, stage, source });
                        }
                        Some(Err(join_error)) => {
                            if join_error.is_cancelled() && cancelled {
                                continue;
                            }
                            join_set.abort_all();
                            return Err(DispatchError::Join(join_error));
                        }
                    }
                }
            }
        }

        let updates: Vec<StageUpdate> = slots.into_iter().flatten().collect();
        if cancelled && updates.is_empty() {
            return Err(DispatchError::Cancelled);
        }
        Ok(BatchOutcome { updates, cancelled })
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(None)
    }
}
