//! # Discovery Loop Demo (streaming events)
//!
//! Drives the discovery preset directly through [`WorkflowRunner`] while a
//! consumer reads the raw event stream, the same pattern a web frontend uses
//! for live progress over SSE or WebSocket.
//!
//! The scripted auditor is never satisfied, so the run walks the full search
//! loop: fan out over the initial queries, reflect, expand with a follow-up
//! query, reflect again, and conclude when the pass budget runs out. Every
//! routing decision and loop transition shows up on the stream as it happens.
//!
//! Run with:
//! ```bash
//! cargo run --example discovery_loop
//! ```

use std::sync::Arc;

use futures_util::StreamExt;
use miette::Result;
use serde_json::json;
use tracing::info;

use delvegraph::event_bus::{Event, RUN_END_SCOPE};
use delvegraph::pipeline;
use delvegraph::runtime::{EffortLevel, RunConfig, WorkflowRunner};
use delvegraph::state::WorkflowState;
use delvegraph::telemetry;
use delvegraph::utils::testing::{ScriptedService, capabilities};

const QUESTION: &str = "what drives unusually high tides?";

fn scripted_backend() -> ScriptedService {
    ScriptedService::new()
        .structured_on(
            "search specialist",
            json!({"queries": ["tide tables", "lunar perigee"]}),
        )
        .grounded_on(
            "web access",
            "Spring tides peak when the moon is closest to Earth.",
            &[("tidal bulletin", "https://example.com/tides")],
        )
        .structured_on(
            "research auditor",
            json!({
                "is_sufficient": false,
                "knowledge_gap": "no coverage of storm surge",
                "follow_up_queries": ["storm surge interaction"],
            }),
        )
        .text_on(
            "complete markdown answer",
            "Unusually high tides come from lunar perigee alignment [s0.0], \
             amplified further by storm surge.",
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    miette::set_panic_hook();

    info!("=== Discovery Loop Demo ===");
    info!("Question: {QUESTION}");

    let workflow = Arc::new(pipeline::discovery_graph().compile()?);
    let service = Arc::new(scripted_backend());
    let config = RunConfig::for_effort(EffortLevel::Low)
        .with_query_count(2)
        .with_max_search_passes(2);
    let runner = Arc::new(
        WorkflowRunner::new(workflow, capabilities(service.clone())).with_config(config),
    );

    // Claim the raw stream before spawning; the runner then leaves its
    // broadcast listener off and this consumer sees every event.
    let mut stream = runner
        .event_bus()
        .take_stream()
        .expect("stream claimed once");

    let handle = Arc::clone(&runner).spawn(WorkflowState::new_with_query(QUESTION));

    info!("📡 Streaming run events:");
    while let Some(event) = stream.next().await {
        info!("📨 [{}] {}", event.scope_label(), event.message());
        if matches!(&event, Event::Diagnostic(d) if d.scope == RUN_END_SCOPE) {
            break;
        }
    }

    let report = handle.join().await?;
    let state = report.state;

    info!("🔍 Search passes used: {}", state.loop_count);
    info!("🧵 Queries issued: {:?}", state.queries);
    info!(
        "📄 Answer:\n{}",
        state.final_report.as_deref().unwrap_or("(no answer)")
    );

    info!("=== Demo Complete ===");
    Ok(())
}
