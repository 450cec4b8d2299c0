//! Replace reducer for scalar fields: the incoming value overwrites the
//! existing one, absent slots leave it untouched.

use super::Reducer;
use crate::stage::StageUpdate;
use crate::state::WorkflowState;
use crate::types::Field;

/// Replace-latest semantics for one scalar field.
///
/// One instance per scalar field is registered by
/// [`ReducerRegistry::standard`](super::ReducerRegistry::standard). Sequence
/// fields have dedicated append reducers; pointing `ReplaceField` at one is a
/// registry construction mistake and applies nothing.
#[derive(Debug, Clone, Copy)]
pub struct ReplaceField(pub Field);

impl Reducer for ReplaceField {
    fn apply(&self, state: &mut WorkflowState, update: &StageUpdate) {
        match self.0 {
            Field::Plan => {
                if let Some(plan) = &update.plan {
                    state.plan = Some(plan.clone());
                }
            }
            Field::Draft => {
                if let Some(draft) = &update.draft {
                    state.draft = Some(draft.clone());
                }
            }
            Field::Critique => {
                if let Some(critique) = &update.critique {
                    state.critique = Some(critique.clone());
                }
            }
            Field::Reflection => {
                if let Some(reflection) = &update.reflection {
                    state.reflection = Some(reflection.clone());
                }
            }
            Field::FinalReport => {
                if let Some(report) = &update.final_report {
                    state.final_report = Some(report.clone());
                }
            }
            Field::Cited => {
                if let Some(cited) = &update.cited {
                    state.cited = cited.clone();
                }
            }
            Field::Phase => {
                if let Some(phase) = update.phase {
                    state.phase = phase;
                }
            }
            Field::RevisionCount => {
                if let Some(count) = update.revision_count {
                    state.revision_count = count;
                }
            }
            Field::LoopCount => {
                if let Some(count) = update.loop_count {
                    state.loop_count = count;
                }
            }
            Field::StartedAt => {
                if let Some(at) = update.started_at {
                    state.started_at = Some(at);
                }
            }
            Field::Messages | Field::Queries | Field::Findings | Field::Sources => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Phase;

    #[test]
    fn replace_overwrites_previous_value() {
        let mut state = WorkflowState::new_with_query("q");
        state.draft = Some("old".into());

        let update = StageUpdate::default().with_draft("new");
        ReplaceField(Field::Draft).apply(&mut state, &update);

        assert_eq!(state.draft.as_deref(), Some("new"));
    }

    #[test]
    fn absent_slot_keeps_existing_value() {
        let mut state = WorkflowState::new_with_query("q");
        state.phase = Phase::Critiquing;

        ReplaceField(Field::Phase).apply(&mut state, &StageUpdate::default());

        assert_eq!(state.phase, Phase::Critiquing);
    }

    #[test]
    fn counters_replace_not_accumulate() {
        let mut state = WorkflowState::new_with_query("q");
        let update = StageUpdate::default().with_revision_count(1);
        ReplaceField(Field::RevisionCount).apply(&mut state, &update);
        ReplaceField(Field::RevisionCount).apply(&mut state, &update);
        assert_eq!(state.revision_count, 1);
    }
}
