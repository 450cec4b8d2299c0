//! # Deep Research Pipeline Demo
//!
//! Runs the deep research preset end to end against a scripted generation
//! backend, so the demo is deterministic and needs no network access.
//!
//! What happens in order:
//!
//! 1. **Plan**: one planner call breaks the question into sub-topics
//! 2. **Fan-out research**: each sub-topic runs as a concurrent task; results
//!    merge back in plan order no matter which task finishes first
//! 3. **Synthesize**: the findings become a draft with citation markers
//! 4. **Critique / revise**: the scripted reviewer asks for a revision; the
//!    bounded revision loop grants exactly one pass, then forces completion
//! 5. **Final polish**: cited markers resolve to URLs and the finished run
//!    lands in the history store
//!
//! Run with:
//! ```bash
//! cargo run --example deep_research
//! ```

use std::sync::Arc;

use miette::Result;
use serde_json::json;
use tracing::info;

use delvegraph::api::{RunRequest, submit};
use delvegraph::records::{InMemoryRecordStore, RecordStore};
use delvegraph::runtime::EffortLevel;
use delvegraph::stage::Capabilities;
use delvegraph::telemetry;
use delvegraph::utils::testing::ScriptedService;

const QUESTION: &str = "how do coral reefs recover after bleaching events?";

/// A generation backend scripted by prompt content. Each rule answers the
/// first prompt containing its needle, which is enough to steer every stage
/// of the preset.
fn scripted_backend() -> ScriptedService {
    ScriptedService::new()
        .structured_on(
            "research planner",
            json!({
                "question": QUESTION,
                "topics": [
                    {"name": "recovery timelines", "queries": ["reef recovery duration"]},
                    {"name": "restoration techniques", "queries": ["coral gardening outcomes"]},
                ],
                "depth": "focused",
            }),
        )
        .grounded_on(
            "Sub-topic: recovery timelines",
            "Reefs need a decade or more between severe bleaching events to rebuild cover.",
            &[
                ("long-term reef survey", "https://example.com/reef-survey"),
                ("bleaching interval study", "https://example.com/intervals"),
            ],
        )
        .grounded_on(
            "Sub-topic: restoration techniques",
            "Coral gardening and larval seeding accelerate recovery on damaged reefs.",
            &[("restoration trials", "https://example.com/restoration")],
        )
        .text_on(
            "Synthesize the research",
            "Reef recovery takes a decade or more [s0.0], though active restoration \
             shortens the timeline on damaged sites [s1.0].",
        )
        .structured_on(
            "critical reviewer",
            json!({
                "assessment": "needs one more pass",
                "strengths": ["well sourced"],
                "weaknesses": ["recovery estimate lacks a caveat"],
                "suggestions": ["note the dependence on local stressors"],
                "should_revise": true,
            }),
        )
        .text_on(
            "report editor",
            "Reef recovery takes a decade or more [s0.0], depending heavily on local \
             stressors, though active restoration shortens the timeline [s1.0].",
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    miette::set_panic_hook();

    info!("=== Deep Research Demo ===");
    info!("Question: {QUESTION}");

    let service = Arc::new(scripted_backend());
    let records = Arc::new(InMemoryRecordStore::new());
    let caps = Capabilities::new(service.clone(), records.clone());

    let request = RunRequest::new(QUESTION).with_effort(EffortLevel::Medium);
    let outcome = submit(request, caps).await?;

    info!("📄 Final report:\n{}", outcome.report);
    info!("🔗 Cited sources:");
    for source in &outcome.cited {
        info!("   {} -> {}", source.label, source.url);
    }
    info!("🧮 Generation calls made: {}", service.calls());
    if let Some(ms) = outcome.duration_ms {
        info!("⏱️ Run took {ms} ms");
    }

    // The run record is already in the history store, exactly as a serving
    // layer would read it back.
    if let Some(id) = outcome.record_id {
        if let Some(record) = records.get(id).await? {
            info!(
                "🗃️ Recorded run: effort={} queries={:?} sources={}",
                record.effort, record.queries, record.source_count
            );
        }
    }

    info!("=== Demo Complete ===");
    Ok(())
}
