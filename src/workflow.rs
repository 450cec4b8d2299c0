//! The compiled, executable form of a graph.
//!
//! A [`Workflow`] is produced by
//! [`GraphBuilder::compile`](crate::graph::GraphBuilder::compile) and is
//! immutable from then on: stages, edges, and the reducer registry are all
//! frozen. The runtime walks it one stage at a time; this module also owns
//! [`Workflow::fold_updates`], the barrier that merges a batch of stage
//! updates into state in deterministic order.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::graph::{ConditionalEdge, FanOutEdge, StageDescriptor};
use crate::reducers::{ReducerError, ReducerRegistry};
use crate::stage::StageUpdate;
use crate::state::WorkflowState;
use crate::types::{Field, StageKind};

/// A validated workflow graph ready for execution.
pub struct Workflow {
    entry: StageKind,
    stages: FxHashMap<StageKind, StageDescriptor>,
    edges: FxHashMap<StageKind, Vec<StageKind>>,
    conditional_edges: FxHashMap<StageKind, ConditionalEdge>,
    fanout_edges: FxHashMap<StageKind, FanOutEdge>,
    registry: ReducerRegistry,
}

impl Workflow {
    pub(crate) fn from_parts(
        entry: StageKind,
        stages: FxHashMap<StageKind, StageDescriptor>,
        edges: FxHashMap<StageKind, Vec<StageKind>>,
        conditional_edges: FxHashMap<StageKind, ConditionalEdge>,
        fanout_edges: FxHashMap<StageKind, FanOutEdge>,
        registry: ReducerRegistry,
    ) -> Self {
        Self {
            entry,
            stages,
            edges,
            conditional_edges,
            fanout_edges,
            registry,
        }
    }

    /// The single stage wired from `Start`.
    pub fn entry(&self) -> &StageKind {
        &self.entry
    }

    pub fn descriptor(&self, kind: &StageKind) -> Option<&StageDescriptor> {
        self.stages.get(kind)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Registered stage kinds in sorted order, mostly for diagnostics.
    pub fn stage_kinds(&self) -> Vec<&StageKind> {
        let mut kinds: Vec<&StageKind> = self.stages.keys().collect();
        kinds.sort();
        kinds
    }

    /// The plain successor of `kind`, if one was wired.
    pub fn next_unconditional(&self, kind: &StageKind) -> Option<&StageKind> {
        self.edges.get(kind).and_then(|targets| targets.first())
    }

    pub fn conditional_edge(&self, kind: &StageKind) -> Option<&ConditionalEdge> {
        self.conditional_edges.get(kind)
    }

    pub fn fanout_edge(&self, kind: &StageKind) -> Option<&FanOutEdge> {
        self.fanout_edges.get(kind)
    }

    pub fn reducer_registry(&self) -> &ReducerRegistry {
        &self.registry
    }

    /// Barrier merge: fold a batch of stage updates into `state`.
    ///
    /// Updates are folded in slice order (the runtime passes them in task
    /// ordinal order, never completion order) and fields within one update
    /// in [`Field::ALL`] declaration order, so the merged state is a pure
    /// function of the prior state and the ordered batch.
    ///
    /// Returns the distinct fields that were written, in first-write order.
    pub fn fold_updates(
        &self,
        state: &mut WorkflowState,
        updates: &[StageUpdate],
    ) -> Result<Vec<Field>, ReducerError> {
        let mut touched: Vec<Field> = Vec::new();
        for update in updates {
            let applied = self.registry.apply_all(state, update)?;
            for field in applied {
                if !touched.contains(&field) {
                    touched.push(field);
                }
            }
        }
        for field in &touched {
            tracing::info!(
                target: "delvegraph::workflow",
                field = %field,
                policy = %field.policy(),
                "field updated"
            );
        }
        Ok(touched)
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("entry", &self.entry)
            .field("stages", &self.stage_kinds())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::message::Message;
    use crate::utils::testing::NoopStage;

    fn single_stage_workflow() -> Workflow {
        GraphBuilder::new()
            .add_stage("only", Field::ALL.to_vec(), NoopStage)
            .add_edge("Start", "only")
            .add_edge("only", "End")
            .compile()
            .unwrap()
    }

    #[test]
    fn fold_applies_updates_in_slice_order() {
        let workflow = single_stage_workflow();
        let mut state = WorkflowState::new_with_query("q");

        let updates = vec![
            StageUpdate::default()
                .with_draft("first")
                .with_messages(vec![Message::assistant("a")]),
            StageUpdate::default()
                .with_draft("second")
                .with_messages(vec![Message::assistant("b")]),
        ];
        let touched = workflow.fold_updates(&mut state, &updates).unwrap();

        // Replace keeps the last write, append keeps both in order.
        assert_eq!(state.draft.as_deref(), Some("second"));
        let contents: Vec<&str> = state.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q", "a", "b"]);
        assert_eq!(touched, vec![Field::Messages, Field::Draft]);
    }

    #[test]
    fn fold_of_empty_batch_is_a_no_op() {
        let workflow = single_stage_workflow();
        let mut state = WorkflowState::new_with_query("q");
        let before = state.clone();
        let touched = workflow.fold_updates(&mut state, &[]).unwrap();
        assert!(touched.is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn entry_and_edges_survive_compilation() {
        let workflow = GraphBuilder::new()
            .add_stage("a", [Field::Phase], NoopStage)
            .add_stage("b", [Field::Phase], NoopStage)
            .add_edge("Start", "a")
            .add_edge("a", "b")
            .add_edge("b", "End")
            .compile()
            .unwrap();

        assert_eq!(workflow.entry(), &StageKind::from("a"));
        assert_eq!(
            workflow.next_unconditional(&StageKind::from("a")),
            Some(&StageKind::from("b"))
        );
        assert!(
            workflow
                .next_unconditional(&StageKind::from("b"))
                .is_some_and(StageKind::is_end)
        );
        assert_eq!(workflow.stage_count(), 2);
    }
}
