#![allow(dead_code)]

use std::sync::Arc;

use delvegraph::records::InMemoryRecordStore;
use delvegraph::service::GenerationService;
use delvegraph::stage::Capabilities;
use delvegraph::state::{Finding, SourceRef, StateSnapshot, WorkflowState};

pub fn empty_snapshot() -> StateSnapshot {
    WorkflowState::default().snapshot()
}

pub fn state_with_query(query: &str) -> WorkflowState {
    WorkflowState::new_with_query(query)
}

/// State mid-run: a query, two findings, and their sources.
pub fn researched_state() -> WorkflowState {
    let mut state = WorkflowState::new_with_query("how do tides work?");
    state.findings.push(Finding::new("moon", 0, "the moon pulls [s0.0]"));
    state.findings.push(Finding::new("sun", 1, "the sun pulls less [s1.0]"));
    state.sources.push(SourceRef::new("[s0.0]", "https://example.com/moon", "moon"));
    state.sources.push(SourceRef::new("[s1.0]", "https://example.com/sun", "sun"));
    state
}

/// Capabilities over an in-memory record store, returning the store handle
/// so tests can inspect what was persisted.
pub fn caps_with_store(
    service: Arc<dyn GenerationService>,
) -> (Capabilities, Arc<InMemoryRecordStore>) {
    let store = Arc::new(InMemoryRecordStore::new());
    (Capabilities::new(service, store.clone()), store)
}
