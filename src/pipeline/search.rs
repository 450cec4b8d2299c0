//! The bounded search loop of the discovery preset.
//!
//! `reflect` is both the join stage of every search fan-out and the loop's
//! decision point. It increments `loop_count`; the router compares the folded
//! counter against `RunConfig::max_search_passes` on every pass, so the bound
//! can be changed between runs of the same compiled graph.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::citations;
use crate::event_bus::Event;
use crate::graph::TaskSeed;
use crate::message::Message;
use crate::revision::{SearchDecision, SearchPolicy, SEARCH_LOOP};
use crate::runtime::RunConfig;
use crate::service::GenerationRequest;
use crate::stage::{Stage, StageContext, StageError, StageUpdate};
use crate::state::{Phase, Reflection, StateSnapshot};

use super::prompts;

const QUERY_LIST_SCHEMA: &str = "search_query_list";
const REFLECTION_SCHEMA: &str = "reflection";

#[derive(Debug, Deserialize)]
struct QueryList {
    queries: Vec<String>,
}

/// Writes the initial batch of search queries for the run.
///
/// Falls back to searching the question verbatim when the structured call
/// fails or produces nothing, so the first fan-out always has work.
#[derive(Clone, Copy, Debug, Default)]
pub struct GenerateQueries;

#[async_trait]
impl Stage for GenerateQueries {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        let question = snapshot
            .latest_user_query()
            .ok_or(StageError::MissingInput { what: "user query" })?
            .to_string();
        let count = ctx.config.query_count;

        let request = super::configured(
            GenerationRequest::structured(&prompts::query_writer(&question, count), QUERY_LIST_SCHEMA),
            &ctx.config,
        );
        let mut queries = match ctx.generator().invoke(request).await {
            Ok(response) => match response.structured_as::<QueryList>(QUERY_LIST_SCHEMA) {
                Ok(list) => list.queries,
                Err(error) => {
                    tracing::warn!(%error, "query output malformed, searching the question verbatim");
                    Vec::new()
                }
            },
            Err(error) => {
                tracing::warn!(%error, "query call failed, searching the question verbatim");
                Vec::new()
            }
        };
        queries.truncate(count as usize);
        if queries.is_empty() {
            queries.push(question);
        }

        ctx.emit(
            "generate_queries",
            &format!("wrote {} search queries", queries.len()),
        )?;

        Ok(StageUpdate::default()
            .with_queries(queries)
            .with_phase(Phase::Researching))
    }
}

/// Evaluates sufficiency of everything gathered so far and advances the
/// loop counter.
#[derive(Clone, Copy, Debug, Default)]
pub struct Reflect;

#[async_trait]
impl Stage for Reflect {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        let question = snapshot
            .latest_user_query()
            .ok_or(StageError::MissingInput { what: "user query" })?;
        let summaries = super::joined_findings(&snapshot);

        let request = super::configured(
            GenerationRequest::structured(&prompts::reflection(question, &summaries), REFLECTION_SCHEMA),
            &ctx.config,
        );
        let reflection = match ctx.generator().invoke(request).await {
            Ok(response) => match response.structured_as::<Reflection>(REFLECTION_SCHEMA) {
                Ok(reflection) => reflection,
                Err(error) => {
                    tracing::warn!(%error, "reflection output malformed, concluding the search");
                    Reflection::sufficient("reflection output malformed")
                }
            },
            Err(error) => {
                tracing::warn!(%error, "reflection call failed, concluding the search");
                Reflection::sufficient("reflection call failed")
            }
        };

        let count = snapshot.loop_count + 1;
        let decision = SearchPolicy::decide(
            reflection.is_sufficient,
            count,
            ctx.config.max_search_passes,
        );
        ctx.emit_event(Event::loop_transition(
            SEARCH_LOOP,
            count,
            Some(ctx.config.max_search_passes),
            &decision.to_string(),
        ))?;

        Ok(StageUpdate::default()
            .with_reflection(reflection)
            .with_loop_count(count))
    }
}

/// Appends the follow-up queries the reflection identified, re-arming the
/// search fan-out for another pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExpandSearch;

#[async_trait]
impl Stage for ExpandSearch {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        SearchPolicy::ensure_can_expand(snapshot.loop_count, ctx.config.max_search_passes)?;
        let reflection = snapshot.reflection.as_ref().ok_or(StageError::MissingInput {
            what: "reflection",
        })?;

        let follow_ups = reflection.follow_up_queries.clone();
        ctx.emit(
            "expand",
            &format!(
                "pass {} of {}: {} follow-up queries",
                snapshot.loop_count,
                ctx.config.max_search_passes,
                follow_ups.len()
            ),
        )?;

        Ok(StageUpdate::default().with_queries(follow_ups))
    }
}

/// Concludes the discovery run: final answer, citation rewrite, cited list.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConcludeSearch;

#[async_trait]
impl Stage for ConcludeSearch {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        let question = snapshot
            .latest_user_query()
            .ok_or(StageError::MissingInput { what: "user query" })?;
        let summaries = super::joined_findings(&snapshot);

        let request = super::configured(
            GenerationRequest::text(&prompts::answer(question, &summaries)),
            &ctx.config,
        );
        let answer = match ctx.generator().invoke(request).await {
            Ok(response) => response.text,
            Err(error) => {
                tracing::warn!(%error, "answer call failed, using joined summaries");
                summaries
            }
        };

        let (resolved, cited) = citations::resolve(&answer, &snapshot.sources);
        ctx.emit(
            "conclude",
            &format!("answer finalized with {} cited sources", cited.len()),
        )?;

        Ok(StageUpdate::default()
            .with_final_report(resolved.clone())
            .with_cited(cited)
            .with_message(Message::assistant(&resolved))
            .with_phase(Phase::Complete))
    }
}

/// Fan-out planner for the initial query batch: one task per query, the
/// position in the list doubling as the citation sequence number.
pub(super) fn initial_query_seeds(snapshot: &StateSnapshot, _config: &RunConfig) -> Vec<TaskSeed> {
    snapshot
        .queries
        .iter()
        .enumerate()
        .map(|(idx, query)| {
            TaskSeed::new(
                super::WEB_SEARCH,
                json!({"query": query, "seq": idx as u32}),
            )
        })
        .collect()
}

/// Fan-out planner for a follow-up pass. Sequence numbers continue where the
/// previous pass stopped, so markers stay unique across the whole run.
pub(super) fn follow_up_seeds(snapshot: &StateSnapshot, _config: &RunConfig) -> Vec<TaskSeed> {
    let Some(reflection) = snapshot.reflection.as_ref() else {
        return Vec::new();
    };
    let follow_ups = &reflection.follow_up_queries;
    let base = snapshot.queries.len().saturating_sub(follow_ups.len()) as u32;
    follow_ups
        .iter()
        .enumerate()
        .map(|(idx, query)| {
            TaskSeed::new(
                super::WEB_SEARCH,
                json!({"query": query, "seq": base + idx as u32}),
            )
        })
        .collect()
}

/// Loop router: expand while the verdict is insufficient and passes remain,
/// reading the bound from config on every pass.
pub(super) fn route_after_reflection(snapshot: &StateSnapshot, config: &RunConfig) -> String {
    let sufficient = snapshot
        .reflection
        .as_ref()
        .is_none_or(|reflection| reflection.is_sufficient);
    match SearchPolicy::decide(sufficient, snapshot.loop_count, config.max_search_passes) {
        SearchDecision::Expand => super::EXPAND_SEARCH.to_string(),
        SearchDecision::Conclude => super::CONCLUDE_SEARCH.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Finding, SourceRef, WorkflowState};
    use crate::utils::testing::{
        stage_context, stage_context_with, structured_service, text_service, unavailable_service,
    };

    fn searched_state(loop_count: u32) -> WorkflowState {
        let mut state = WorkflowState::new_with_query("how does io_uring work");
        state.queries = vec!["io_uring basics".into(), "io_uring vs epoll".into()];
        state.findings = vec![Finding::new("io_uring basics", 0, "ring buffers [s0.0]")];
        state.sources = vec![SourceRef::new("[s0.0]", "https://kernel.example", "LWN")];
        state.loop_count = loop_count;
        state
    }

    #[tokio::test]
    async fn generated_queries_are_capped_by_config() {
        let service = structured_service(json!({
            "queries": ["a", "b", "c", "d"]
        }));
        let config = RunConfig::default().with_query_count(2);
        let ctx = stage_context_with("generate_queries", service, config);
        let snapshot = WorkflowState::new_with_query("q").snapshot();

        let update = GenerateQueries.run(snapshot, ctx).await.unwrap();
        assert_eq!(update.queries, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn failed_query_call_searches_the_question_itself() {
        let ctx = stage_context("generate_queries", unavailable_service());
        let snapshot = WorkflowState::new_with_query("what is ebpf").snapshot();

        let update = GenerateQueries.run(snapshot, ctx).await.unwrap();
        assert_eq!(update.queries, Some(vec!["what is ebpf".to_string()]));
    }

    #[tokio::test]
    async fn reflect_increments_the_loop_counter() {
        let service = structured_service(json!({
            "is_sufficient": false,
            "knowledge_gap": "missing benchmarks",
            "follow_up_queries": ["io_uring benchmarks"]
        }));
        let ctx = stage_context("reflect", service);

        let update = Reflect.run(searched_state(0).snapshot(), ctx).await.unwrap();
        assert_eq!(update.loop_count, Some(1));
        let reflection = update.reflection.unwrap();
        assert!(!reflection.is_sufficient);
        assert_eq!(reflection.follow_up_queries.len(), 1);
    }

    #[tokio::test]
    async fn failed_reflection_concludes_the_search() {
        let ctx = stage_context("reflect", unavailable_service());
        let update = Reflect.run(searched_state(1).snapshot(), ctx).await.unwrap();
        assert!(update.reflection.unwrap().is_sufficient);
        assert_eq!(update.loop_count, Some(2));
    }

    #[tokio::test]
    async fn expand_appends_the_follow_ups() {
        let mut state = searched_state(1);
        state.reflection = Some(Reflection {
            is_sufficient: false,
            knowledge_gap: "gap".into(),
            follow_up_queries: vec!["deeper".into()],
        });
        let ctx = stage_context("expand_search", unavailable_service());

        let update = ExpandSearch.run(state.snapshot(), ctx).await.unwrap();
        assert_eq!(update.queries, Some(vec!["deeper".to_string()]));
    }

    #[tokio::test]
    async fn expand_at_the_bound_is_a_ceiling_violation() {
        let mut state = searched_state(3);
        state.reflection = Some(Reflection {
            is_sufficient: false,
            knowledge_gap: "gap".into(),
            follow_up_queries: vec!["deeper".into()],
        });
        let ctx = stage_context("expand_search", unavailable_service());

        let error = ExpandSearch.run(state.snapshot(), ctx).await.unwrap_err();
        assert!(matches!(error, StageError::Ceiling(_)));
    }

    #[tokio::test]
    async fn conclude_rewrites_markers_and_completes() {
        let ctx = stage_context("conclude_search", text_service("rings are mapped [s0.0]"));
        let update = ConcludeSearch
            .run(searched_state(1).snapshot(), ctx)
            .await
            .unwrap();

        let report = update.final_report.unwrap();
        assert_eq!(report, "rings are mapped https://kernel.example");
        assert_eq!(update.cited.unwrap().len(), 1);
        assert_eq!(update.phase, Some(Phase::Complete));
    }

    #[test]
    fn initial_seeds_number_from_zero() {
        let seeds = initial_query_seeds(&searched_state(0).snapshot(), &RunConfig::default());
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].params["seq"], 0);
        assert_eq!(seeds[1].params["query"], "io_uring vs epoll");
    }

    #[test]
    fn follow_up_seeds_continue_the_numbering() {
        let mut state = searched_state(1);
        state.queries = vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()];
        state.reflection = Some(Reflection {
            is_sufficient: false,
            knowledge_gap: "gap".into(),
            follow_up_queries: vec!["d".into(), "e".into()],
        });

        let seeds = follow_up_seeds(&state.snapshot(), &RunConfig::default());
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].params["seq"], 3);
        assert_eq!(seeds[1].params["seq"], 4);
    }

    #[test]
    fn router_reads_the_bound_from_config_each_pass() {
        let mut state = searched_state(2);
        state.reflection = Some(Reflection {
            is_sufficient: false,
            knowledge_gap: "gap".into(),
            follow_up_queries: vec!["q".into()],
        });
        let snapshot = state.snapshot();

        let tight = RunConfig::default().with_max_search_passes(2);
        assert_eq!(
            route_after_reflection(&snapshot, &tight),
            super::super::CONCLUDE_SEARCH
        );

        let roomy = RunConfig::default().with_max_search_passes(5);
        assert_eq!(
            route_after_reflection(&snapshot, &roomy),
            super::super::EXPAND_SEARCH
        );
    }

    #[test]
    fn sufficient_reflection_routes_to_conclusion() {
        let mut state = searched_state(1);
        state.reflection = Some(Reflection::sufficient("plenty"));
        assert_eq!(
            route_after_reflection(&state.snapshot(), &RunConfig::default()),
            super::super::CONCLUDE_SEARCH
        );
    }
}
