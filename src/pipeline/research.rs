//! Research task stages: the units a fan-out runs in parallel, plus the
//! aggregation stage both presets join on.
//!
//! A task's generation call failing is a local event. The task still
//! contributes a finding (the fixed fallback text) so the join barrier sees
//! every ordinal, and sibling tasks are never disturbed.

use async_trait::async_trait;
use serde::Deserialize;

use crate::citations;
use crate::service::{GenerationRequest, FALLBACK_TEXT};
use crate::stage::{Stage, StageContext, StageError, StageUpdate};
use crate::state::{Finding, Phase, SourceRef, StateSnapshot};

use super::prompts;

/// Params carried by a deep-research fan-out seed.
#[derive(Debug, Deserialize)]
struct TopicParams {
    topic: String,
    #[serde(default)]
    queries: Vec<String>,
    seq: u32,
}

/// Params carried by a discovery fan-out seed.
#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    seq: u32,
}

/// Researches one planned sub-topic with a grounded generation call.
///
/// Minted citation markers are appended to the researched text and the
/// gathered sources are listed under the block, so the synthesis stage can
/// carry markers into the draft verbatim.
#[derive(Clone, Copy, Debug, Default)]
pub struct TopicResearch;

#[async_trait]
impl Stage for TopicResearch {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        let params: TopicParams = ctx.task_params()?;
        let request = super::configured(
            GenerationRequest::grounded(&prompts::topic_research(&params.topic, &params.queries)),
            &ctx.config,
        );

        let (body, sources) = match ctx.generator().invoke(request).await {
            Ok(response) => {
                let sources = citations::attach_markers(params.seq, response.grounding_refs());
                (response.text, sources)
            }
            Err(error) => {
                tracing::warn!(%error, topic = %params.topic, "research call failed, using fallback text");
                (FALLBACK_TEXT.to_string(), Vec::new())
            }
        };

        ctx.emit(
            "research",
            &format!("researched `{}` ({} sources)", params.topic, sources.len()),
        )?;

        let block = topic_block(&params.topic, &body, &sources);
        Ok(StageUpdate::default()
            .with_findings(vec![Finding::new(&params.topic, params.seq, &block)])
            .with_sources(sources))
    }
}

/// Runs one web search query with a grounded generation call.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSearch;

#[async_trait]
impl Stage for WebSearch {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        let params: SearchParams = ctx.task_params()?;
        let request = super::configured(
            GenerationRequest::grounded(&prompts::web_search(&params.query)),
            &ctx.config,
        );

        let (body, sources) = match ctx.generator().invoke(request).await {
            Ok(response) => {
                let sources = citations::attach_markers(params.seq, response.grounding_refs());
                (with_markers(&response.text, &sources), sources)
            }
            Err(error) => {
                tracing::warn!(%error, query = %params.query, "search call failed, using fallback text");
                (FALLBACK_TEXT.to_string(), Vec::new())
            }
        };

        ctx.emit(
            "search",
            &format!("searched `{}` ({} sources)", params.query, sources.len()),
        )?;

        Ok(StageUpdate::default()
            .with_findings(vec![Finding::new(&params.query, params.seq, &body)])
            .with_sources(sources))
    }
}

/// Join stage of the deep-research fan-out. All task deltas are already
/// folded when it runs; it reports the totals and advances the phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct Aggregate;

#[async_trait]
impl Stage for Aggregate {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        ctx.emit(
            "aggregate",
            &format!(
                "aggregated {} research blocks with {} sources",
                snapshot.findings.len(),
                snapshot.sources.len()
            ),
        )?;
        Ok(StageUpdate::default().with_phase(Phase::Researching))
    }
}

/// Markdown block for one researched sub-topic, sources listed below it.
fn topic_block(topic: &str, body: &str, sources: &[SourceRef]) -> String {
    let mut block = format!("## {topic}\n\n{}", with_markers(body, sources));
    if !sources.is_empty() {
        block.push_str("\n\n### Sources\n");
        for source in sources.iter().take(5) {
            block.push_str(&format!("- [{}]({})\n", source.label, source.url));
        }
    }
    block
}

/// Appends the minted markers so they appear literally in draft text.
fn with_markers(body: &str, sources: &[SourceRef]) -> String {
    if sources.is_empty() {
        return body.to_string();
    }
    let markers = sources
        .iter()
        .map(|s| s.marker.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    format!("{body} {markers}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WorkflowState;
    use crate::utils::testing::{grounded_service, task_context, unavailable_service};
    use serde_json::json;

    #[tokio::test]
    async fn topic_task_mints_markers_from_its_sequence() {
        let service = grounded_service(
            "summary text",
            &[("Rust Blog", "https://blog.rust-lang.org"), ("RFC", "https://rfcs.example")],
        );
        let ctx = task_context(
            "topic_research",
            1,
            json!({"topic": "nll", "queries": ["nll rfc"], "seq": 1}),
            service,
        );
        let snapshot = WorkflowState::new_with_query("q").snapshot();

        let update = TopicResearch.run(snapshot, ctx).await.unwrap();
        let sources = update.sources.unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].marker, "[s1.0]");
        assert_eq!(sources[1].marker, "[s1.1]");

        let findings = update.findings.unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].body.starts_with("## nll"));
        assert!(findings[0].body.contains("[s1.0] [s1.1]"));
        assert!(findings[0].body.contains("- [Rust Blog](https://blog.rust-lang.org)"));
    }

    #[tokio::test]
    async fn failed_topic_task_degrades_to_fallback_text() {
        let ctx = task_context(
            "topic_research",
            0,
            json!({"topic": "nll", "queries": [], "seq": 0}),
            unavailable_service(),
        );
        let snapshot = WorkflowState::new_with_query("q").snapshot();

        let update = TopicResearch.run(snapshot, ctx).await.unwrap();
        assert_eq!(update.sources, Some(Vec::new()));
        let findings = update.findings.unwrap();
        assert!(findings[0].body.contains(FALLBACK_TEXT));
    }

    #[tokio::test]
    async fn web_search_keeps_markers_in_the_finding_body() {
        let service = grounded_service("observed", &[("Doc", "https://doc.example")]);
        let ctx = task_context(
            "web_search",
            3,
            json!({"query": "async traits", "seq": 3}),
            service,
        );
        let snapshot = WorkflowState::new_with_query("q").snapshot();

        let update = WebSearch.run(snapshot, ctx).await.unwrap();
        let findings = update.findings.unwrap();
        assert_eq!(findings[0].topic, "async traits");
        assert_eq!(findings[0].seq, 3);
        assert!(findings[0].body.ends_with("[s3.0]"));
    }

    #[tokio::test]
    async fn outside_a_task_the_params_are_missing_input() {
        let ctx = crate::utils::testing::stage_context("web_search", unavailable_service());
        let snapshot = WorkflowState::new_with_query("q").snapshot();
        let error = WebSearch.run(snapshot, ctx).await.unwrap_err();
        assert!(matches!(error, StageError::MissingInput { .. }));
    }

    #[tokio::test]
    async fn aggregate_only_advances_the_phase() {
        let ctx = crate::utils::testing::stage_context("aggregate", unavailable_service());
        let snapshot = WorkflowState::new_with_query("q").snapshot();
        let update = Aggregate.run(snapshot, ctx).await.unwrap();
        assert_eq!(update.phase, Some(Phase::Researching));
        assert!(update.findings.is_none());
    }
}
