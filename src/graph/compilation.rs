use miette::Diagnostic;
use thiserror::Error;

use crate::graph::builder::GraphBuilder;
use crate::types::{Field, StageKind};
use crate::workflow::Workflow;

/// Wiring problems detected when a [`GraphBuilder`] is compiled.
///
/// Every variant is a definition-time bug in the graph, not a runtime
/// condition: a compiled [`Workflow`] is guaranteed to have a single
/// entry, at most one outgoing route per stage, no dangling edge
/// endpoints, and reducer coverage for every declared write.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphCompileError {
    #[error("graph has no registered stages")]
    #[diagnostic(
        code(delvegraph::graph::empty),
        help("register at least one stage with add_stage before compiling")
    )]
    EmptyGraph,

    #[error("no entry edge: nothing is wired from Start")]
    #[diagnostic(
        code(delvegraph::graph::no_entry),
        help("add a single plain edge from \"Start\" to the first stage")
    )]
    NoEntry,

    #[error("{count} edges leave Start, expected exactly one")]
    #[diagnostic(
        code(delvegraph::graph::multiple_entries),
        help("the executor walks a single path; wire Start to exactly one stage")
    )]
    MultipleEntries { count: usize },

    #[error("stage `{stage}` is referenced by {referenced_by} but never registered")]
    #[diagnostic(
        code(delvegraph::graph::missing_stage),
        help("register the stage with add_stage, or fix the edge endpoint")
    )]
    MissingStage { stage: String, referenced_by: String },

    #[error("stage `{stage}` has more than one outgoing route")]
    #[diagnostic(
        code(delvegraph::graph::conflicting_routes),
        help(
            "give each stage at most one of: a plain edge, a conditional edge, or a fan-out edge"
        )
    )]
    ConflictingRoutes { stage: String },

    #[error("conditional edge from `{stage}` declares no targets")]
    #[diagnostic(
        code(delvegraph::graph::no_conditional_targets),
        help("list every stage the router may name, so the wiring can be checked")
    )]
    NoConditionalTargets { stage: String },

    #[error("stage `{stage}` declares a write to `{field}` but no reducer covers it")]
    #[diagnostic(
        code(delvegraph::graph::unregistered_field),
        help("extend the reducer registry with with_reducer, or drop the field from the write set")
    )]
    UnregisteredField { stage: String, field: Field },
}

impl GraphBuilder {
    /// Validate the wiring and freeze it into an executable [`Workflow`].
    pub fn compile(self) -> Result<Workflow, GraphCompileError> {
        if self.stages.is_empty() {
            return Err(GraphCompileError::EmptyGraph);
        }

        let entry = self.resolve_entry()?;
        self.check_route_exclusivity()?;
        self.check_endpoints()?;
        self.check_field_coverage()?;

        Ok(Workflow::from_parts(
            entry,
            self.stages,
            self.edges,
            self.conditional_edges,
            self.fanout_edges,
            self.registry,
        ))
    }

    fn resolve_entry(&self) -> Result<StageKind, GraphCompileError> {
        let start = StageKind::Start;
        if self.conditional_edges.contains_key(&start) || self.fanout_edges.contains_key(&start) {
            return Err(GraphCompileError::ConflictingRoutes {
                stage: start.to_string(),
            });
        }
        match self.edges.get(&start).map(Vec::as_slice).unwrap_or(&[]) {
            [] => Err(GraphCompileError::NoEntry),
            [one] => Ok(one.clone()),
            many => Err(GraphCompileError::MultipleEntries { count: many.len() }),
        }
    }

    fn check_route_exclusivity(&self) -> Result<(), GraphCompileError> {
        let mut kinds: Vec<&StageKind> = self.stages.keys().collect();
        kinds.sort();
        for kind in kinds {
            let plain = self.edges.get(kind).map_or(0, Vec::len);
            let conditional = self.conditional_edges.contains_key(kind);
            let fanout = self.fanout_edges.contains_key(kind);
            let routes = plain + usize::from(conditional) + usize::from(fanout);
            if routes > 1 {
                return Err(GraphCompileError::ConflictingRoutes {
                    stage: kind.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_endpoints(&self) -> Result<(), GraphCompileError> {
        let mut sources: Vec<&StageKind> = self.edges.keys().collect();
        sources.sort();
        for from in sources {
            if !from.is_start() && !self.stages.contains_key(from) {
                return Err(GraphCompileError::MissingStage {
                    stage: from.to_string(),
                    referenced_by: "an edge source".to_string(),
                });
            }
            for to in &self.edges[from] {
                if !to.is_end() && !self.stages.contains_key(to) {
                    return Err(GraphCompileError::MissingStage {
                        stage: to.to_string(),
                        referenced_by: format!("the edge from `{from}`"),
                    });
                }
            }
        }

        let mut conditional: Vec<&StageKind> = self.conditional_edges.keys().collect();
        conditional.sort();
        for from in conditional {
            let edge = &self.conditional_edges[from];
            if !self.stages.contains_key(from) {
                return Err(GraphCompileError::MissingStage {
                    stage: from.to_string(),
                    referenced_by: "a conditional edge source".to_string(),
                });
            }
            if edge.targets().is_empty() {
                return Err(GraphCompileError::NoConditionalTargets {
                    stage: from.to_string(),
                });
            }
            for target in edge.targets() {
                if !target.is_end() && !self.stages.contains_key(target) {
                    return Err(GraphCompileError::MissingStage {
                        stage: target.to_string(),
                        referenced_by: format!("the conditional edge from `{from}`"),
                    });
                }
            }
        }

        let mut fanout: Vec<&StageKind> = self.fanout_edges.keys().collect();
        fanout.sort();
        for from in fanout {
            let edge = &self.fanout_edges[from];
            if !self.stages.contains_key(from) {
                return Err(GraphCompileError::MissingStage {
                    stage: from.to_string(),
                    referenced_by: "a fan-out edge source".to_string(),
                });
            }
            let join = edge.join_stage();
            if !join.is_end() && !self.stages.contains_key(join) {
                return Err(GraphCompileError::MissingStage {
                    stage: join.to_string(),
                    referenced_by: format!("the fan-out join of `{from}`"),
                });
            }
        }
        Ok(())
    }

    fn check_field_coverage(&self) -> Result<(), GraphCompileError> {
        let mut kinds: Vec<&StageKind> = self.stages.keys().collect();
        kinds.sort();
        for kind in kinds {
            let descriptor = &self.stages[kind];
            let missing = self.registry.missing_for(&descriptor.writes);
            if let Some(field) = missing.first() {
                return Err(GraphCompileError::UnregisteredField {
                    stage: kind.to_string(),
                    field: *field,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducers::ReducerRegistry;
    use crate::utils::testing::NoopStage;
    use std::sync::Arc;

    #[test]
    fn compile_rejects_empty_graph() {
        let err = GraphBuilder::new().compile().unwrap_err();
        assert!(matches!(err, GraphCompileError::EmptyGraph));
    }

    #[test]
    fn compile_requires_single_entry() {
        let err = GraphBuilder::new()
            .add_stage("a", [Field::Phase], NoopStage)
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphCompileError::NoEntry));

        let err = GraphBuilder::new()
            .add_stage("a", [Field::Phase], NoopStage)
            .add_stage("b", [Field::Phase], NoopStage)
            .add_edge("Start", "a")
            .add_edge("Start", "b")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphCompileError::MultipleEntries { count: 2 }));
    }

    #[test]
    fn compile_rejects_dangling_edge_target() {
        let err = GraphBuilder::new()
            .add_stage("a", [Field::Phase], NoopStage)
            .add_edge("Start", "a")
            .add_edge("a", "ghost")
            .compile()
            .unwrap_err();
        match err {
            GraphCompileError::MissingStage { stage, .. } => {
                assert_eq!(stage, "ghost");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn compile_rejects_two_routes_from_one_stage() {
        let err = GraphBuilder::new()
            .add_stage("a", [Field::Phase], NoopStage)
            .add_stage("b", [Field::Phase], NoopStage)
            .add_edge("Start", "a")
            .add_edge("a", "b")
            .add_conditional_edge(
                "a",
                vec![crate::types::StageKind::from("b")],
                Arc::new(|_s, _c| "b".to_string()),
            )
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphCompileError::ConflictingRoutes { .. }));
    }

    #[test]
    fn compile_rejects_uncovered_write() {
        let err = GraphBuilder::new()
            .add_stage("a", [Field::Draft], NoopStage)
            .add_edge("Start", "a")
            .with_reducer_registry(ReducerRegistry::empty())
            .compile()
            .unwrap_err();
        match err {
            GraphCompileError::UnregisteredField { stage, field } => {
                assert_eq!(stage, "a");
                assert_eq!(field, Field::Draft);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
