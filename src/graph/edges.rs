use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::runtime::RunConfig;
use crate::state::StateSnapshot;
use crate::types::StageKind;

/// Routing function attached to a [`ConditionalEdge`].
///
/// Routers are pure: they inspect the committed snapshot plus the run
/// configuration and name the single stage that runs next. All loop
/// counters and verdicts they consult live in the snapshot, so replaying
/// the same snapshot always yields the same route.
pub type RouterFn = Arc<dyn Fn(&StateSnapshot, &RunConfig) -> String + Send + Sync>;

/// Planning function attached to a [`FanOutEdge`].
///
/// Planners read the committed snapshot and return the batch of tasks to
/// dispatch in parallel. Returning an empty batch is legal and causes the
/// executor to skip straight to the join stage.
pub type PlannerFn = Arc<dyn Fn(&StateSnapshot, &RunConfig) -> Vec<TaskSeed> + Send + Sync>;

/// One unit of parallel work produced by a [`PlannerFn`].
///
/// The seed names the stage to run and carries a JSON payload with the
/// task-specific inputs (topic name, query text, and so on). The executor
/// assigns each seed an ordinal in batch order; results are folded back
/// into state in that same order regardless of completion timing.
#[derive(Clone, Debug)]
pub struct TaskSeed {
    /// Stage that will execute this task.
    pub target: StageKind,
    /// Task-local parameters, decoded by the stage via
    /// [`StageContext::task_params`](crate::stage::StageContext::task_params).
    pub params: Value,
}

impl TaskSeed {
    pub fn new(target: impl Into<StageKind>, params: Value) -> Self {
        Self {
            target: target.into(),
            params,
        }
    }
}

/// Conditional hand-off evaluated after `from` commits.
///
/// The router returns a stage name which must be one of `targets` (or
/// `"End"`); anything else is a fatal wiring bug surfaced by the runner.
#[derive(Clone)]
pub struct ConditionalEdge {
    from: StageKind,
    router: RouterFn,
    targets: Vec<StageKind>,
}

impl ConditionalEdge {
    pub fn new(from: StageKind, router: RouterFn, targets: Vec<StageKind>) -> Self {
        Self {
            from,
            router,
            targets,
        }
    }

    pub fn from_stage(&self) -> &StageKind {
        &self.from
    }

    /// Declared candidate targets, used for compile-time validation and
    /// for checking the router's answer at runtime.
    pub fn targets(&self) -> &[StageKind] {
        &self.targets
    }

    /// Run the router against a committed snapshot.
    pub fn route(&self, snapshot: &StateSnapshot, config: &RunConfig) -> String {
        (self.router)(snapshot, config)
    }

    /// Whether `name` matches one of the declared targets.
    pub fn permits(&self, name: &str) -> bool {
        let kind = StageKind::decode(name);
        kind.is_end() || self.targets.iter().any(|t| *t == kind)
    }
}

impl fmt::Debug for ConditionalEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalEdge")
            .field("from", &self.from)
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

/// Fan-out hand-off evaluated after `from` commits.
///
/// The planner seeds a batch of parallel tasks; once every task has
/// finished and its updates are folded in, control passes to `join`.
#[derive(Clone)]
pub struct FanOutEdge {
    from: StageKind,
    planner: PlannerFn,
    join: StageKind,
}

impl FanOutEdge {
    pub fn new(from: StageKind, planner: PlannerFn, join: StageKind) -> Self {
        Self {
            from,
            planner,
            join,
        }
    }

    pub fn from_stage(&self) -> &StageKind {
        &self.from
    }

    /// Stage that runs after the whole batch has been folded in.
    pub fn join_stage(&self) -> &StageKind {
        &self.join
    }

    /// Run the planner against a committed snapshot.
    pub fn plan(&self, snapshot: &StateSnapshot, config: &RunConfig) -> Vec<TaskSeed> {
        (self.planner)(snapshot, config)
    }
}

impl fmt::Debug for FanOutEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOutEdge")
            .field("from", &self.from)
            .field("join", &self.join)
            .finish_non_exhaustive()
    }
}
