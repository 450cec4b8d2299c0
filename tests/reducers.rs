use std::sync::Arc;

use delvegraph::message::Message;
use delvegraph::reducers::{AppendQueries, ReducerError, ReducerRegistry};
use delvegraph::stage::StageUpdate;
use delvegraph::state::{Finding, Phase, SourceRef, WorkflowState};
use delvegraph::types::{Field, MergePolicy};

mod common;
use common::*;

/********************
 * Append reducers
 ********************/

#[test]
fn append_messages_preserves_existing_entries() {
    let registry = ReducerRegistry::standard();
    let mut state = state_with_query("q");
    let before = state.messages.len();

    let update = StageUpdate::default().with_message(Message::assistant("reply"));
    registry
        .try_update(Field::Messages, &mut state, &update)
        .unwrap();

    assert_eq!(state.messages.len(), before + 1);
    assert!(state.messages[0].has_role(Message::USER));
    assert_message_contains(&state, "reply");
}

#[test]
fn append_queries_keeps_incoming_order() {
    let registry = ReducerRegistry::standard();
    let mut state = WorkflowState::default();

    let first = StageUpdate::default().with_queries(vec!["a".into(), "b".into()]);
    let second = StageUpdate::default().with_queries(vec!["c".into()]);
    registry.apply_all(&mut state, &first).unwrap();
    registry.apply_all(&mut state, &second).unwrap();

    assert_eq!(state.queries, vec!["a", "b", "c"]);
}

#[test]
fn append_findings_and_sources_accumulate() {
    let registry = ReducerRegistry::standard();
    let mut state = researched_state();

    let update = StageUpdate::default()
        .with_findings(vec![Finding::new("wind", 2, "wind matters [s2.0]")])
        .with_sources(vec![SourceRef::new(
            "[s2.0]",
            "https://example.com/wind",
            "wind",
        )]);
    registry.apply_all(&mut state, &update).unwrap();

    assert_finding_topics(&state, &["moon", "sun", "wind"]);
    assert_eq!(state.sources.len(), 3);
}

#[test]
fn empty_sequence_write_changes_nothing() {
    let registry = ReducerRegistry::standard();
    let mut state = researched_state();
    let before = state.clone();

    let update = StageUpdate::default().with_queries(Vec::new());
    registry.apply_all(&mut state, &update).unwrap();

    assert_eq!(state, before);
}

/********************
 * Replace reducers
 ********************/

#[test]
fn replace_scalar_overwrites_previous_value() {
    let registry = ReducerRegistry::standard();
    let mut state = WorkflowState::default();

    registry
        .apply_all(&mut state, &StageUpdate::default().with_draft("v1"))
        .unwrap();
    registry
        .apply_all(&mut state, &StageUpdate::default().with_draft("v2"))
        .unwrap();

    assert_eq!(state.draft.as_deref(), Some("v2"));
}

#[test]
fn replace_covers_counters_and_phase() {
    let registry = ReducerRegistry::standard();
    let mut state = WorkflowState::default();

    let update = StageUpdate::default()
        .with_phase(Phase::Revising)
        .with_revision_count(1)
        .with_loop_count(3);
    let written = registry.apply_all(&mut state, &update).unwrap();

    assert_eq!(
        written,
        vec![Field::Phase, Field::RevisionCount, Field::LoopCount]
    );
    assert_phase(&state, Phase::Revising);
    assert_eq!(state.revision_count, 1);
    assert_eq!(state.loop_count, 3);
}

#[test]
fn unwritten_fields_are_untouched() {
    let registry = ReducerRegistry::standard();
    let mut state = researched_state();
    let findings_before = state.findings.clone();

    registry
        .apply_all(&mut state, &StageUpdate::default().with_draft("only draft"))
        .unwrap();

    assert_eq!(state.findings, findings_before);
    assert_eq!(state.draft.as_deref(), Some("only draft"));
}

/********************
 * Registry coverage
 ********************/

#[test]
fn standard_registry_covers_every_field() {
    let registry = ReducerRegistry::standard();
    for field in Field::ALL {
        assert!(registry.covers(field), "no reducer for {field}");
        assert_eq!(registry.policy(field), Some(field.policy()));
    }
}

#[test]
fn sequence_fields_append_and_scalars_replace() {
    assert_eq!(Field::Messages.policy(), MergePolicy::Append);
    assert_eq!(Field::Queries.policy(), MergePolicy::Append);
    assert_eq!(Field::Findings.policy(), MergePolicy::Append);
    assert_eq!(Field::Sources.policy(), MergePolicy::Append);
    assert_eq!(Field::Draft.policy(), MergePolicy::Replace);
    assert_eq!(Field::RevisionCount.policy(), MergePolicy::Replace);
}

#[test]
fn empty_registry_rejects_any_write() {
    let registry = ReducerRegistry::empty();
    let mut state = WorkflowState::default();

    let err = registry
        .try_update(
            Field::Draft,
            &mut state,
            &StageUpdate::default().with_draft("x"),
        )
        .unwrap_err();
    assert_eq!(err, ReducerError::Unregistered(Field::Draft));
}

#[test]
fn missing_for_reports_sorted_unique_gaps() {
    let registry = ReducerRegistry::empty().with_reducer(Field::Draft, Arc::new(AppendQueries));

    let missing = registry.missing_for(&[
        Field::Phase,
        Field::Queries,
        Field::Draft,
        Field::Queries,
    ]);
    assert_eq!(missing, vec![Field::Queries, Field::Phase]);
}

#[test]
fn apply_all_reports_fields_in_declaration_order() {
    let registry = ReducerRegistry::standard();
    let mut state = WorkflowState::default();

    // Build the update in scrambled order; the fold is positional anyway.
    let update = StageUpdate::default()
        .with_phase(Phase::Researching)
        .with_queries(vec!["q".into()])
        .with_message(Message::system("sys"));
    let written = registry.apply_all(&mut state, &update).unwrap();

    assert_eq!(written, vec![Field::Messages, Field::Queries, Field::Phase]);
}
