//! The shipped research pipeline: stage implementations and the two graph
//! presets built from them.
//!
//! Both presets share the same collaborator surface (a
//! [`GenerationService`](crate::service::GenerationService) injected through
//! stage capabilities) and the same degradation rule: a failed generation
//! call never fails the run, it downgrades that one stage's contribution.
//!
//! - [`deep_research_graph`] plans sub-topics, researches them in parallel,
//!   then synthesizes, critiques and revises a report under the fixed
//!   revision ceiling.
//! - [`discovery_graph`] searches in passes: fan out over queries, reflect
//!   on sufficiency, expand with follow-up queries while the configured
//!   pass budget allows.

use std::sync::Arc;

use crate::graph::GraphBuilder;
use crate::runtime::RunConfig;
use crate::service::GenerationRequest;
use crate::state::StateSnapshot;
use crate::types::{Field, StageKind};

pub mod prompts;

mod plan;
mod research;
mod review;
mod search;
mod synthesize;

pub use plan::PlanResearch;
pub use research::{Aggregate, TopicResearch, WebSearch};
pub use review::{CritiqueDraft, ReviseDraft};
pub use search::{ConcludeSearch, ExpandSearch, GenerateQueries, Reflect};
pub use synthesize::{FinalPolish, Synthesize};

/// Stage names of the deep-research preset.
pub const PLAN: &str = "plan";
pub const TOPIC_RESEARCH: &str = "topic_research";
pub const AGGREGATE: &str = "aggregate";
pub const SYNTHESIZE: &str = "synthesize";
pub const CRITIQUE: &str = "critique";
pub const REVISE: &str = "revise";
pub const FINAL_POLISH: &str = "final_polish";

/// Stage names of the discovery preset.
pub const GENERATE_QUERIES: &str = "generate_queries";
pub const WEB_SEARCH: &str = "web_search";
pub const REFLECT: &str = "reflect";
pub const EXPAND_SEARCH: &str = "expand_search";
pub const CONCLUDE_SEARCH: &str = "conclude_search";

/// Plan, parallel research, synthesis, bounded critique/revise, polish.
///
/// Returned uncompiled so callers can swap stages or the reducer registry
/// before [`compile`](GraphBuilder::compile).
#[must_use]
pub fn deep_research_graph() -> GraphBuilder {
    GraphBuilder::new()
        .add_stage(
            PLAN,
            [Field::Plan, Field::Phase, Field::RevisionCount],
            PlanResearch,
        )
        .add_stage(TOPIC_RESEARCH, [Field::Findings, Field::Sources], TopicResearch)
        .add_stage(AGGREGATE, [Field::Phase], Aggregate)
        .add_stage(SYNTHESIZE, [Field::Draft, Field::Phase], Synthesize)
        .add_stage(CRITIQUE, [Field::Critique, Field::Phase], CritiqueDraft)
        .add_stage(
            REVISE,
            [Field::Draft, Field::RevisionCount, Field::Phase],
            ReviseDraft,
        )
        .add_stage(
            FINAL_POLISH,
            [Field::FinalReport, Field::Cited, Field::Messages, Field::Phase],
            FinalPolish,
        )
        .add_edge(StageKind::Start, PLAN)
        .add_fanout_edge(PLAN, AGGREGATE, Arc::new(plan::topic_seeds))
        .add_edge(AGGREGATE, SYNTHESIZE)
        .add_edge(SYNTHESIZE, CRITIQUE)
        .add_conditional_edge(
            CRITIQUE,
            [REVISE.into(), FINAL_POLISH.into()],
            Arc::new(review::route_after_critique),
        )
        .add_edge(REVISE, CRITIQUE)
        .add_edge(FINAL_POLISH, StageKind::End)
}

/// Query generation, parallel web search, bounded reflect/expand loop,
/// final answer.
#[must_use]
pub fn discovery_graph() -> GraphBuilder {
    GraphBuilder::new()
        .add_stage(GENERATE_QUERIES, [Field::Queries, Field::Phase], GenerateQueries)
        .add_stage(WEB_SEARCH, [Field::Findings, Field::Sources], WebSearch)
        .add_stage(REFLECT, [Field::Reflection, Field::LoopCount], Reflect)
        .add_stage(EXPAND_SEARCH, [Field::Queries], ExpandSearch)
        .add_stage(
            CONCLUDE_SEARCH,
            [Field::FinalReport, Field::Cited, Field::Messages, Field::Phase],
            ConcludeSearch,
        )
        .add_edge(StageKind::Start, GENERATE_QUERIES)
        .add_fanout_edge(GENERATE_QUERIES, REFLECT, Arc::new(search::initial_query_seeds))
        .add_conditional_edge(
            REFLECT,
            [EXPAND_SEARCH.into(), CONCLUDE_SEARCH.into()],
            Arc::new(search::route_after_reflection),
        )
        .add_fanout_edge(EXPAND_SEARCH, REFLECT, Arc::new(search::follow_up_seeds))
        .add_edge(CONCLUDE_SEARCH, StageKind::End)
}

/// Applies the configured model label, when one is set, to a request.
fn configured(request: GenerationRequest, config: &RunConfig) -> GenerationRequest {
    match config.model.as_deref() {
        Some(model) => request.with_model(model),
        None => request,
    }
}

/// Research blocks joined the way the synthesis and reflection prompts
/// expect them.
fn joined_findings(snapshot: &StateSnapshot) -> String {
    snapshot
        .findings
        .iter()
        .map(|finding| finding.body.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_research_preset_compiles() {
        let workflow = deep_research_graph().compile().unwrap();
        assert_eq!(workflow.entry(), &StageKind::from(PLAN));
        assert_eq!(workflow.stage_count(), 7);
        assert!(workflow.fanout_edge(&StageKind::from(PLAN)).is_some());
        assert!(workflow.conditional_edge(&StageKind::from(CRITIQUE)).is_some());
    }

    #[test]
    fn discovery_preset_compiles() {
        let workflow = discovery_graph().compile().unwrap();
        assert_eq!(workflow.entry(), &StageKind::from(GENERATE_QUERIES));
        assert_eq!(workflow.stage_count(), 5);
        assert!(
            workflow
                .fanout_edge(&StageKind::from(EXPAND_SEARCH))
                .is_some()
        );
    }

    #[test]
    fn configured_requests_carry_the_model_label() {
        let config = RunConfig::default().with_model("delve-large");
        let request = configured(GenerationRequest::text("p"), &config);
        assert_eq!(request.model.as_deref(), Some("delve-large"));

        let request = configured(GenerationRequest::text("p"), &RunConfig::default());
        assert!(request.model.is_none());
    }
}
