//! Runtime execution: configuration, the walk executor, and fan-out
//! dispatch.
//!
//! [`WorkflowRunner`] drives a compiled workflow one stage at a time:
//! run the stage, fold its delta at the barrier, then route. A fan-out
//! edge hands the batch to the [`Dispatcher`], which runs the tasks
//! concurrently and returns their deltas in task ordinal order so the
//! fold stays deterministic. [`RunConfig`] travels alongside and is read
//! by routers and planners on every evaluation.

mod config;
mod dispatch;
mod runner;

pub use config::{EffortLevel, RunConfig};
pub use dispatch::{BatchOutcome, DispatchError, Dispatcher};
pub use runner::{ExecutorError, RunHandle, RunReport, WorkflowRunner};
