use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::graph::edges::{ConditionalEdge, FanOutEdge, PlannerFn, RouterFn};
use crate::reducers::ReducerRegistry;
use crate::stage::Stage;
use crate::types::{Field, StageKind};

/// A registered stage plus the fields it declares it may write.
///
/// The write set is checked against the reducer registry at compile time,
/// and the runner warns when a stage's update strays outside it.
#[derive(Clone)]
pub struct StageDescriptor {
    pub stage: Arc<dyn Stage>,
    pub writes: Vec<Field>,
}

impl StageDescriptor {
    pub fn new(stage: Arc<dyn Stage>, writes: Vec<Field>) -> Self {
        Self { stage, writes }
    }

    pub fn declares(&self, field: Field) -> bool {
        self.writes.contains(&field)
    }
}

/// Fluent builder for workflow graphs.
///
/// Stages are registered under a [`StageKind`], wired together with plain,
/// conditional, or fan-out edges, and validated as a whole by
/// [`compile`](GraphBuilder::compile). `Start` and `End` are virtual: they
/// anchor edges but never carry a stage implementation.
///
/// ```
/// use std::sync::Arc;
/// use delvegraph::graph::GraphBuilder;
/// use delvegraph::stage::{Stage, StageContext, StageError, StageUpdate};
/// use delvegraph::state::{Phase, StateSnapshot};
/// use delvegraph::types::Field;
///
/// struct Touch;
///
/// #[async_trait::async_trait]
/// impl Stage for Touch {
///     async fn run(
///         &self,
///         _snapshot: StateSnapshot,
///         _ctx: StageContext,
///     ) -> Result<StageUpdate, StageError> {
///         Ok(StageUpdate::default().with_phase(Phase::Complete))
///     }
/// }
///
/// let workflow = GraphBuilder::new()
///     .add_stage("touch", [Field::Phase], Touch)
///     .add_edge("Start", "touch")
///     .add_edge("touch", "End")
///     .compile()
///     .unwrap();
/// assert_eq!(workflow.entry().encode(), "Custom:touch");
/// ```
pub struct GraphBuilder {
    pub(super) stages: FxHashMap<StageKind, StageDescriptor>,
    pub(super) edges: FxHashMap<StageKind, Vec<StageKind>>,
    pub(super) conditional_edges: FxHashMap<StageKind, ConditionalEdge>,
    pub(super) fanout_edges: FxHashMap<StageKind, FanOutEdge>,
    pub(super) registry: ReducerRegistry,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            stages: FxHashMap::default(),
            edges: FxHashMap::default(),
            conditional_edges: FxHashMap::default(),
            fanout_edges: FxHashMap::default(),
            registry: ReducerRegistry::standard(),
        }
    }

    /// Register a stage under `kind`, declaring the fields it may write.
    ///
    /// Attempts to register the virtual `Start`/`End` stages are ignored
    /// with a warning. Re-registering a name replaces the earlier stage.
    #[must_use]
    pub fn add_stage<K, W, S>(mut self, kind: K, writes: W, stage: S) -> Self
    where
        K: Into<StageKind>,
        W: Into<Vec<Field>>,
        S: Stage + 'static,
    {
        let kind = kind.into();
        if kind.is_start() || kind.is_end() {
            warn!(stage = %kind, "ignoring attempt to register a virtual stage");
            return self;
        }
        if self
            .stages
            .insert(kind.clone(), StageDescriptor::new(Arc::new(stage), writes.into()))
            .is_some()
        {
            warn!(stage = %kind, "stage re-registered, replacing earlier definition");
        }
        self
    }

    /// Wire an unconditional hand-off from one stage to the next.
    #[must_use]
    pub fn add_edge(mut self, from: impl Into<StageKind>, to: impl Into<StageKind>) -> Self {
        self.edges.entry(from.into()).or_default().push(to.into());
        self
    }

    /// Wire a conditional hand-off: after `from` commits, `router` picks
    /// one of `targets` (or `End`) from the fresh snapshot.
    #[must_use]
    pub fn add_conditional_edge(
        mut self,
        from: impl Into<StageKind>,
        targets: impl IntoIterator<Item = StageKind>,
        router: RouterFn,
    ) -> Self {
        let from = from.into();
        let edge = ConditionalEdge::new(from.clone(), router, targets.into_iter().collect());
        if self.conditional_edges.insert(from.clone(), edge).is_some() {
            warn!(stage = %from, "conditional edge re-registered, replacing earlier router");
        }
        self
    }

    /// Wire a fan-out: after `from` commits, `planner` seeds a batch of
    /// parallel tasks, and once the batch is folded in control passes to
    /// `join`.
    #[must_use]
    pub fn add_fanout_edge(
        mut self,
        from: impl Into<StageKind>,
        join: impl Into<StageKind>,
        planner: PlannerFn,
    ) -> Self {
        let from = from.into();
        let edge = FanOutEdge::new(from.clone(), planner, join.into());
        if self.fanout_edges.insert(from.clone(), edge).is_some() {
            warn!(stage = %from, "fan-out edge re-registered, replacing earlier planner");
        }
        self
    }

    /// Replace the default reducer registry.
    ///
    /// The registry is fixed at definition time; compile fails if any
    /// declared write set names a field the registry does not cover.
    #[must_use]
    pub fn with_reducer_registry(mut self, registry: ReducerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Number of registered (non-virtual) stages.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn has_stage(&self, kind: &StageKind) -> bool {
        self.stages.contains_key(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::NoopStage;

    #[test]
    fn virtual_stages_are_not_registered() {
        let builder = GraphBuilder::new()
            .add_stage("Start", [Field::Phase], NoopStage)
            .add_stage("End", [Field::Phase], NoopStage)
            .add_stage("real", [Field::Phase], NoopStage);
        assert_eq!(builder.stage_count(), 1);
        assert!(builder.has_stage(&StageKind::from("real")));
    }

    #[test]
    fn re_registering_replaces() {
        let builder = GraphBuilder::new()
            .add_stage("plan", [Field::Plan], NoopStage)
            .add_stage("plan", [Field::Plan, Field::Phase], NoopStage);
        assert_eq!(builder.stage_count(), 1);
        let descriptor = &builder.stages[&StageKind::from("plan")];
        assert!(descriptor.declares(Field::Phase));
    }
}
