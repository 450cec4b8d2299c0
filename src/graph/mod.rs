//! Graph definition and compilation.
//!
//! A workflow is declared as a set of named stages plus three edge kinds:
//!
//! - **plain** (`add_edge`): unconditional hand-off to the next stage;
//! - **conditional** (`add_conditional_edge`): a pure router inspects the
//!   committed snapshot and picks one declared target;
//! - **fan-out** (`add_fanout_edge`): a pure planner seeds a batch of
//!   parallel tasks whose results all fold in before the join stage runs.
//!
//! [`GraphBuilder::compile`] validates the wiring (single entry, one route
//! per stage, no dangling endpoints, reducer coverage for every declared
//! write) and freezes it into a [`Workflow`](crate::workflow::Workflow)
//! that the runtime can execute.

mod builder;
mod compilation;
mod edges;

pub use builder::{GraphBuilder, StageDescriptor};
pub use compilation::GraphCompileError;
pub use edges::{ConditionalEdge, FanOutEdge, PlannerFn, RouterFn, TaskSeed};
