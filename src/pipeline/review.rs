//! The revision loop: critique, revise, and the back-edge router.
//!
//! The ceiling is enforced twice on purpose. The critique stage clamps its
//! own verdict, and the router re-derives the decision from the same state.
//! The revise stage additionally asserts it was routed to legally; reaching
//! it at the ceiling means both enforcement points failed, which aborts the
//! run as a [`CeilingViolation`](crate::revision::CeilingViolation).

use async_trait::async_trait;

use crate::event_bus::Event;
use crate::revision::{RevisionDecision, RevisionPolicy, REVISION_LOOP};
use crate::runtime::RunConfig;
use crate::service::GenerationRequest;
use crate::stage::{Stage, StageContext, StageError, StageUpdate};
use crate::state::{Critique, Phase, StateSnapshot};

use super::prompts;

const CRITIQUE_SCHEMA: &str = "critique_assessment";

/// Assesses the current draft and stores a ceiling-clamped revision verdict.
#[derive(Clone, Copy, Debug, Default)]
pub struct CritiqueDraft;

#[async_trait]
impl Stage for CritiqueDraft {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        let draft = snapshot.current_draft().ok_or(StageError::MissingInput {
            what: "draft report",
        })?;
        let policy = RevisionPolicy::default();

        let critique = if snapshot.revision_count >= policy.ceiling() {
            // No call needed: the verdict is forced regardless of quality.
            Critique {
                assessment: "revision budget exhausted, completing with the current report"
                    .to_string(),
                strengths: Vec::new(),
                weaknesses: Vec::new(),
                suggestions: Vec::new(),
                should_revise: false,
            }
        } else {
            let request = super::configured(
                GenerationRequest::structured(&prompts::critique(draft), CRITIQUE_SCHEMA)
                    .with_temperature(0.7),
                &ctx.config,
            );
            let mut critique = match ctx.generator().invoke(request).await {
                Ok(response) => match response.structured_as::<Critique>(CRITIQUE_SCHEMA) {
                    Ok(critique) => critique,
                    Err(error) => {
                        tracing::warn!(%error, "critique output malformed, completing without revision");
                        Critique::fallback("assessment output malformed")
                    }
                },
                Err(error) => {
                    tracing::warn!(%error, "critique call failed, completing without revision");
                    Critique::fallback("assessment call failed")
                }
            };
            critique.should_revise =
                policy.clamp_verdict(critique.should_revise, snapshot.revision_count);
            critique
        };

        let decision = policy.decide(critique.should_revise, snapshot.revision_count);
        ctx.emit_event(Event::loop_transition(
            REVISION_LOOP,
            snapshot.revision_count,
            Some(policy.ceiling()),
            &decision.to_string(),
        ))?;

        Ok(StageUpdate::default()
            .with_critique(critique)
            .with_phase(Phase::Critiquing))
    }
}

/// Reworks the draft according to the stored critique and advances the
/// revision counter.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReviseDraft;

#[async_trait]
impl Stage for ReviseDraft {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        let policy = RevisionPolicy::default();
        policy.ensure_can_revise(snapshot.revision_count)?;

        let draft = snapshot.current_draft().ok_or(StageError::MissingInput {
            what: "draft report",
        })?;
        let critique = snapshot.critique.as_ref().ok_or(StageError::MissingInput {
            what: "critique",
        })?;

        let request = super::configured(
            GenerationRequest::text(&prompts::revision(draft, critique)).with_temperature(0.3),
            &ctx.config,
        );
        let revised = match ctx.generator().invoke(request).await {
            Ok(response) => response.text,
            Err(error) => {
                tracing::warn!(%error, "revision call failed, keeping the current draft");
                draft.to_string()
            }
        };

        let count = snapshot.revision_count + 1;
        ctx.emit(
            "revise",
            &format!("revision pass {count} of {}", policy.ceiling()),
        )?;

        Ok(StageUpdate::default()
            .with_draft(revised)
            .with_revision_count(count)
            .with_phase(Phase::Revising))
    }
}

/// Back-edge router. Re-derives the revision decision from the folded state
/// so a corrupted verdict cannot route past the ceiling.
pub(super) fn route_after_critique(snapshot: &StateSnapshot, _config: &RunConfig) -> String {
    let should_revise = snapshot
        .critique
        .as_ref()
        .is_some_and(|critique| critique.should_revise);
    match RevisionPolicy::default().decide(should_revise, snapshot.revision_count) {
        RevisionDecision::Revise => super::REVISE.to_string(),
        RevisionDecision::Finalize => super::FINAL_POLISH.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WorkflowState;
    use crate::utils::testing::{
        stage_context, structured_service, text_service, unavailable_service,
    };
    use serde_json::json;

    fn drafted_state(revision_count: u32) -> WorkflowState {
        let mut state = WorkflowState::new_with_query("q");
        state.draft = Some("draft body".to_string());
        state.revision_count = revision_count;
        state
    }

    fn revise_verdict() -> serde_json::Value {
        json!({
            "assessment": "needs work",
            "strengths": ["coverage"],
            "weaknesses": ["structure"],
            "suggestions": ["tighten the intro"],
            "should_revise": true
        })
    }

    #[tokio::test]
    async fn critique_stores_the_verdict_below_the_ceiling() {
        let ctx = stage_context("critique", structured_service(revise_verdict()));
        let update = CritiqueDraft
            .run(drafted_state(0).snapshot(), ctx)
            .await
            .unwrap();
        let critique = update.critique.unwrap();
        assert!(critique.should_revise);
        assert_eq!(critique.suggestions, vec!["tighten the intro".to_string()]);
    }

    #[tokio::test]
    async fn critique_clamps_the_verdict_at_the_ceiling() {
        let ctx = stage_context("critique", structured_service(revise_verdict()));
        let update = CritiqueDraft
            .run(drafted_state(1).snapshot(), ctx)
            .await
            .unwrap();
        assert!(!update.critique.unwrap().should_revise);
    }

    #[tokio::test]
    async fn failed_critique_call_completes_without_revision() {
        let ctx = stage_context("critique", unavailable_service());
        let update = CritiqueDraft
            .run(drafted_state(0).snapshot(), ctx)
            .await
            .unwrap();
        assert!(!update.critique.unwrap().should_revise);
    }

    #[tokio::test]
    async fn revise_increments_the_counter_and_replaces_the_draft() {
        let mut state = drafted_state(0);
        state.critique = Some(Critique {
            assessment: "needs work".into(),
            strengths: vec![],
            weaknesses: vec![],
            suggestions: vec!["expand".into()],
            should_revise: true,
        });
        let ctx = stage_context("revise", text_service("improved draft"));

        let update = ReviseDraft.run(state.snapshot(), ctx).await.unwrap();
        assert_eq!(update.draft.as_deref(), Some("improved draft"));
        assert_eq!(update.revision_count, Some(1));
        assert_eq!(update.phase, Some(Phase::Revising));
    }

    #[tokio::test]
    async fn revise_at_the_ceiling_is_a_ceiling_violation() {
        let mut state = drafted_state(1);
        state.critique = Some(Critique::fallback("n/a"));
        let ctx = stage_context("revise", text_service("improved draft"));

        let error = ReviseDraft.run(state.snapshot(), ctx).await.unwrap_err();
        assert!(matches!(error, StageError::Ceiling(_)));
    }

    #[test]
    fn router_follows_the_clamped_decision() {
        let mut state = drafted_state(0);
        state.critique = Some(Critique {
            should_revise: true,
            ..Critique::fallback("n/a")
        });
        assert_eq!(
            route_after_critique(&state.snapshot(), &RunConfig::default()),
            super::super::REVISE
        );

        state.revision_count = 1;
        assert_eq!(
            route_after_critique(&state.snapshot(), &RunConfig::default()),
            super::super::FINAL_POLISH
        );

        state.revision_count = 0;
        state.critique = None;
        assert_eq!(
            route_after_critique(&state.snapshot(), &RunConfig::default()),
            super::super::FINAL_POLISH
        );
    }
}
