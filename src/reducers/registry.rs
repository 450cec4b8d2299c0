//! The per-field reducer registry.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use super::append::{AppendFindings, AppendMessages, AppendQueries, AppendSources};
use super::replace::ReplaceField;
use super::Reducer;
use crate::stage::StageUpdate;
use crate::state::WorkflowState;
use crate::types::{Field, MergePolicy};

/// A field was written without a registered reducer.
///
/// Graph compilation makes this unreachable for declared writes; it can only
/// surface from a hand-built registry missing entries.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum ReducerError {
    #[error("no reducer registered for field `{0}`")]
    #[diagnostic(
        code(delvegraph::reducers::unregistered),
        help("register a reducer for the field or use ReducerRegistry::standard")
    )]
    Unregistered(Field),
}

/// Maps every state field to its single declared reducer.
///
/// Fixed once the graph compiles: stages declare their written fields and
/// compilation checks coverage, turning a missing reducer into a
/// definition-time error instead of a runtime one.
#[derive(Clone)]
pub struct ReducerRegistry {
    reducers: FxHashMap<Field, Arc<dyn Reducer>>,
}

impl Default for ReducerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ReducerRegistry {
    /// Registry covering every field with its declared policy: append for
    /// sequences, replace for scalars.
    #[must_use]
    pub fn standard() -> Self {
        let mut reducers: FxHashMap<Field, Arc<dyn Reducer>> = FxHashMap::default();
        for field in Field::ALL {
            let reducer: Arc<dyn Reducer> = match field {
                Field::Messages => Arc::new(AppendMessages),
                Field::Queries => Arc::new(AppendQueries),
                Field::Findings => Arc::new(AppendFindings),
                Field::Sources => Arc::new(AppendSources),
                scalar => Arc::new(ReplaceField(scalar)),
            };
            reducers.insert(field, reducer);
        }
        Self { reducers }
    }

    /// Empty registry, for tests that exercise coverage failures.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            reducers: FxHashMap::default(),
        }
    }

    /// Overrides (or adds) the reducer for one field.
    #[must_use]
    pub fn with_reducer(mut self, field: Field, reducer: Arc<dyn Reducer>) -> Self {
        self.reducers.insert(field, reducer);
        self
    }

    #[must_use]
    pub fn covers(&self, field: Field) -> bool {
        self.reducers.contains_key(&field)
    }

    /// Declared fields with no registered reducer, in declaration order.
    #[must_use]
    pub fn missing_for(&self, declared: &[Field]) -> Vec<Field> {
        let mut missing: Vec<Field> = declared
            .iter()
            .copied()
            .filter(|field| !self.covers(*field))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    /// Declared policy for a field, when the standard mapping knows it.
    #[must_use]
    pub fn policy(&self, field: Field) -> Option<MergePolicy> {
        self.covers(field).then(|| field.policy())
    }

    /// Applies a single field of the update.
    pub fn try_update(
        &self,
        field: Field,
        state: &mut WorkflowState,
        update: &StageUpdate,
    ) -> Result<(), ReducerError> {
        let reducer = self
            .reducers
            .get(&field)
            .ok_or(ReducerError::Unregistered(field))?;
        reducer.apply(state, update);
        Ok(())
    }

    /// Folds every written field of one update into the state, in field
    /// declaration order. Returns the fields applied.
    pub fn apply_all(
        &self,
        state: &mut WorkflowState,
        update: &StageUpdate,
    ) -> Result<Vec<Field>, ReducerError> {
        let written = update.written_fields();
        for field in &written {
            self.try_update(*field, state, update)?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_is_total() {
        let registry = ReducerRegistry::standard();
        for field in Field::ALL {
            assert!(registry.covers(field), "{field} uncovered");
        }
        assert!(registry.missing_for(&Field::ALL).is_empty());
    }

    #[test]
    fn empty_registry_reports_missing_fields() {
        let registry = ReducerRegistry::empty();
        let missing = registry.missing_for(&[Field::Draft, Field::Sources, Field::Draft]);
        assert_eq!(missing, vec![Field::Sources, Field::Draft]);
    }

    #[test]
    fn unregistered_write_is_an_error() {
        let registry = ReducerRegistry::empty();
        let mut state = WorkflowState::new_with_query("q");
        let update = StageUpdate::default().with_draft("d");
        let err = registry
            .apply_all(&mut state, &update)
            .unwrap_err();
        assert_eq!(err, ReducerError::Unregistered(Field::Draft));
    }

    #[test]
    fn apply_all_reports_written_fields_in_order() {
        let registry = ReducerRegistry::standard();
        let mut state = WorkflowState::new_with_query("q");
        let update = StageUpdate::default()
            .with_loop_count(1)
            .with_queries(vec!["a".into()]);
        let applied = registry.apply_all(&mut state, &update).unwrap();
        assert_eq!(applied, vec![Field::Queries, Field::LoopCount]);
        assert_eq!(state.loop_count, 1);
    }
}
