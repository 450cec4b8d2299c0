//! Planning stage of the deep-research preset.

use async_trait::async_trait;
use serde_json::json;

use crate::graph::TaskSeed;
use crate::runtime::RunConfig;
use crate::service::GenerationRequest;
use crate::stage::{Stage, StageContext, StageError, StageUpdate};
use crate::state::{Phase, ResearchPlan, StateSnapshot};

use super::prompts;

const PLAN_SCHEMA: &str = "research_plan";

/// Decomposes the research question into a structured plan and resets the
/// revision counter for the run.
///
/// When the structured call fails (unavailable service or non-conforming
/// payload) it degrades to a single-topic plan built from the question, so
/// downstream fan-out always has at least one topic to research.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlanResearch;

#[async_trait]
impl Stage for PlanResearch {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        let question = snapshot
            .latest_user_query()
            .ok_or(StageError::MissingInput { what: "user query" })?
            .to_string();

        let request = super::configured(
            GenerationRequest::structured(&prompts::plan(&question), PLAN_SCHEMA),
            &ctx.config,
        );
        let plan = match ctx.generator().invoke(request).await {
            Ok(response) => match response.structured_as::<ResearchPlan>(PLAN_SCHEMA) {
                Ok(plan) => plan,
                Err(error) => {
                    tracing::warn!(%error, "plan output malformed, degrading to single topic");
                    ResearchPlan::fallback(&question)
                }
            },
            Err(error) => {
                tracing::warn!(%error, "planning call failed, degrading to single topic");
                ResearchPlan::fallback(&question)
            }
        };

        ctx.emit(
            "plan",
            &format!("planned {} sub-topics ({})", plan.topics.len(), plan.depth),
        )?;

        Ok(StageUpdate::default()
            .with_plan(plan)
            .with_phase(Phase::Planning)
            .with_revision_count(0))
    }
}

/// Fan-out planner: one research task per planned sub-topic.
///
/// The position in the topic list doubles as the task's citation sequence
/// number, so markers minted by sibling tasks can never collide.
pub(super) fn topic_seeds(snapshot: &StateSnapshot, _config: &RunConfig) -> Vec<TaskSeed> {
    let Some(plan) = snapshot.plan.as_ref() else {
        return Vec::new();
    };
    plan.topics
        .iter()
        .enumerate()
        .map(|(idx, topic)| {
            TaskSeed::new(
                super::TOPIC_RESEARCH,
                json!({
                    "topic": topic.name,
                    "queries": topic.queries,
                    "seq": idx as u32,
                }),
            )
        })
        .collect()
}
