use delvegraph::state::{Phase, WorkflowState};

#[allow(dead_code)]
pub fn assert_message_contains(state: &WorkflowState, needle: &str) {
    let found = state.messages.iter().any(|m| m.content.contains(needle));
    assert!(
        found,
        "expected at least one message containing '{needle}', got: {:?}",
        state.messages
    );
}

#[allow(dead_code)]
pub fn assert_phase(state: &WorkflowState, phase: Phase) {
    assert_eq!(
        state.phase, phase,
        "expected phase {phase}, got {}",
        state.phase
    );
}

#[allow(dead_code)]
pub fn assert_finding_topics(state: &WorkflowState, topics: &[&str]) {
    let got: Vec<&str> = state.findings.iter().map(|f| f.topic.as_str()).collect();
    assert_eq!(got, topics, "finding topics out of order or missing");
}
