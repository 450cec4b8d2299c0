//! Reducers: declared merge semantics for every workflow state field.
//!
//! A [`Reducer`] folds one field of a [`StageUpdate`](crate::stage::StageUpdate)
//! into [`WorkflowState`](crate::state::WorkflowState). The
//! [`ReducerRegistry`] maps each [`Field`](crate::types::Field) to exactly one
//! reducer and is fixed at graph-definition time;
//! [`GraphBuilder::compile`](crate::graph::GraphBuilder::compile) refuses any
//! graph whose stages declare a field the registry does not cover.
//!
//! Two policies cover this system: [`append`] reducers for the sequence
//! fields and [`replace`] for scalars. Reducers are deliberately dumb, with
//! no deduplication and no reordering, so a barrier fold is a pure function
//! of (state, ordered updates).
//!
//! # Example
//!
//! ```
//! use delvegraph::reducers::ReducerRegistry;
//! use delvegraph::stage::StageUpdate;
//! use delvegraph::state::WorkflowState;
//!
//! let registry = ReducerRegistry::standard();
//! let mut state = WorkflowState::new_with_query("q");
//! let update = StageUpdate::default().with_queries(vec!["first".into()]);
//!
//! let applied = registry.apply_all(&mut state, &update).unwrap();
//! assert_eq!(applied.len(), 1);
//! assert_eq!(state.queries, vec!["first".to_string()]);
//! ```

mod append;
mod registry;
mod replace;

pub use append::{AppendFindings, AppendMessages, AppendQueries, AppendSources};
pub use registry::{ReducerError, ReducerRegistry};
pub use replace::ReplaceField;

use crate::stage::StageUpdate;
use crate::state::WorkflowState;

/// Merges one field of an update into the state.
///
/// Implementations touch only their own field and must be no-ops when the
/// update does not write it.
pub trait Reducer: Send + Sync {
    fn apply(&self, state: &mut WorkflowState, update: &StageUpdate);
}
