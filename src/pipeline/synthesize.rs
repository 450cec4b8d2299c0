//! Draft synthesis and final polish for the deep-research preset.

use async_trait::async_trait;

use crate::citations;
use crate::message::Message;
use crate::revision::REVISION_CEILING;
use crate::service::GenerationRequest;
use crate::stage::{Stage, StageContext, StageError, StageUpdate};
use crate::state::{Phase, StateSnapshot};

use super::prompts;

/// Merges every researched block into one draft report.
///
/// On a failed generation call the joined research blocks themselves become
/// the draft: the run still produces a report, just an unpolished one.
#[derive(Clone, Copy, Debug, Default)]
pub struct Synthesize;

#[async_trait]
impl Stage for Synthesize {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        let question = snapshot
            .plan
            .as_ref()
            .map(|plan| plan.question.clone())
            .or_else(|| snapshot.latest_user_query().map(String::from))
            .ok_or(StageError::MissingInput { what: "user query" })?;
        let joined = super::joined_findings(&snapshot);

        let request = super::configured(
            GenerationRequest::text(&prompts::synthesis(&question, &joined)).with_temperature(0.2),
            &ctx.config,
        );
        let draft = match ctx.generator().invoke(request).await {
            Ok(response) => response.text,
            Err(error) => {
                tracing::warn!(%error, "synthesis call failed, using joined research blocks");
                joined
            }
        };

        ctx.emit("synthesize", &format!("drafted {} chars", draft.len()))?;

        Ok(StageUpdate::default()
            .with_draft(draft)
            .with_phase(Phase::Synthesizing))
    }
}

/// Finalizes the deep-research report.
///
/// Rewrites every matched citation marker to its canonical URL, derives the
/// cited-source list from what actually appears in the text, appends the run
/// summary footer, and publishes the report as an assistant message.
#[derive(Clone, Copy, Debug, Default)]
pub struct FinalPolish;

#[async_trait]
impl Stage for FinalPolish {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        let draft = snapshot.current_draft().ok_or(StageError::MissingInput {
            what: "draft report",
        })?;

        let (resolved, cited) = citations::resolve(draft, &snapshot.sources);
        let report = format!(
            "{resolved}{}",
            run_summary(
                snapshot.findings.len(),
                snapshot.sources.len(),
                snapshot.revision_count,
            )
        );

        ctx.emit(
            "polish",
            &format!("report finalized with {} cited sources", cited.len()),
        )?;

        Ok(StageUpdate::default()
            .with_final_report(report.clone())
            .with_cited(cited)
            .with_message(Message::assistant(&report))
            .with_phase(Phase::Complete))
    }
}

fn run_summary(findings: usize, sources: usize, revisions: u32) -> String {
    format!(
        "\n\n---\n\n## Research summary\n\n\
         - Research blocks: {findings}\n\
         - Sources gathered: {sources}\n\
         - Revision passes: {revisions} (ceiling {REVISION_CEILING})\n\
         \n\
         Generated {}\n",
        prompts::current_date(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Finding, SourceRef, WorkflowState};
    use crate::utils::testing::{stage_context, text_service, unavailable_service};

    fn researched_state() -> WorkflowState {
        let mut state = WorkflowState::new_with_query("what is miri");
        state.findings = vec![
            Finding::new("interp", 0, "## interp\n\nmiri interprets MIR [s0.0]"),
            Finding::new("ub", 1, "## ub\n\nchecks for UB [s1.0]"),
        ];
        state.sources = vec![
            SourceRef::new("[s0.0]", "https://a.example", "A"),
            SourceRef::new("[s1.0]", "https://b.example", "B"),
            SourceRef::new("[s1.1]", "https://c.example", "C"),
        ];
        state
    }

    #[tokio::test]
    async fn synthesize_uses_the_generated_draft() {
        let ctx = stage_context("synthesize", text_service("polished draft [s0.0]"));
        let update = Synthesize
            .run(researched_state().snapshot(), ctx)
            .await
            .unwrap();
        assert_eq!(update.draft.as_deref(), Some("polished draft [s0.0]"));
        assert_eq!(update.phase, Some(Phase::Synthesizing));
    }

    #[tokio::test]
    async fn synthesize_falls_back_to_joined_blocks() {
        let ctx = stage_context("synthesize", unavailable_service());
        let update = Synthesize
            .run(researched_state().snapshot(), ctx)
            .await
            .unwrap();
        let draft = update.draft.unwrap();
        assert!(draft.contains("miri interprets MIR"));
        assert!(draft.contains("\n\n---\n\n"));
        assert!(draft.contains("checks for UB"));
    }

    #[tokio::test]
    async fn polish_rewrites_markers_and_keeps_only_cited_sources() {
        let mut state = researched_state();
        state.draft = Some("claim [s0.0], more [s1.0]".to_string());
        state.revision_count = 1;
        let ctx = stage_context("final_polish", unavailable_service());

        let update = FinalPolish.run(state.snapshot(), ctx).await.unwrap();
        let report = update.final_report.unwrap();
        assert!(report.contains("claim https://a.example, more https://b.example"));
        assert!(report.contains("Revision passes: 1"));

        let cited = update.cited.unwrap();
        assert_eq!(cited.len(), 2);
        assert!(cited.iter().all(|s| s.marker != "[s1.1]"));

        let messages = update.messages.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].has_role(Message::ASSISTANT));
        assert_eq!(update.phase, Some(Phase::Complete));
    }

    #[tokio::test]
    async fn polish_without_a_draft_is_missing_input() {
        let ctx = stage_context("final_polish", unavailable_service());
        let error = FinalPolish
            .run(WorkflowState::new_with_query("q").snapshot(), ctx)
            .await
            .unwrap_err();
        assert!(matches!(error, StageError::MissingInput { .. }));
    }
}
