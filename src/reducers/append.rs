//! Append reducers for the sequence fields.
//!
//! Each concatenates the incoming items onto the existing sequence,
//! preserving the incoming internal order. An empty incoming sequence is a
//! no-op rather than a write.

use super::Reducer;
use crate::stage::StageUpdate;
use crate::state::WorkflowState;

/// Appends incoming messages to the transcript.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppendMessages;

impl Reducer for AppendMessages {
    fn apply(&self, state: &mut WorkflowState, update: &StageUpdate) {
        if let Some(messages) = &update.messages {
            state.messages.extend(messages.iter().cloned());
        }
    }
}

/// Appends executed search queries.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppendQueries;

impl Reducer for AppendQueries {
    fn apply(&self, state: &mut WorkflowState, update: &StageUpdate) {
        if let Some(queries) = &update.queries {
            state.queries.extend(queries.iter().cloned());
        }
    }
}

/// Appends researched findings.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppendFindings;

impl Reducer for AppendFindings {
    fn apply(&self, state: &mut WorkflowState, update: &StageUpdate) {
        if let Some(findings) = &update.findings {
            state.findings.extend(findings.iter().cloned());
        }
    }
}

/// Appends gathered source references.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppendSources;

impl Reducer for AppendSources {
    fn apply(&self, state: &mut WorkflowState, update: &StageUpdate) {
        if let Some(sources) = &update.sources {
            state.sources.extend(sources.iter().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn append_preserves_existing_and_incoming_order() {
        let mut state = WorkflowState::new_with_query("q");
        let update = StageUpdate::default().with_messages(vec![
            Message::assistant("first"),
            Message::assistant("second"),
        ]);

        AppendMessages.apply(&mut state, &update);

        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[1].content, "first");
        assert_eq!(state.messages[2].content, "second");
    }

    #[test]
    fn absent_slot_is_a_no_op() {
        let mut state = WorkflowState::new_with_query("q");
        AppendQueries.apply(&mut state, &StageUpdate::default());
        assert!(state.queries.is_empty());
    }
}
