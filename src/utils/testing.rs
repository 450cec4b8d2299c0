//! Test doubles shared by unit tests, integration tests and demos.
//!
//! The substitutes here stand in for the two collaborator interfaces: canned
//! generation services with fixed behavior, a rule-driven
//! [`ScriptedService`] for multi-stage scenarios, and a record store that
//! always fails. Context builders construct a [`StageContext`] wired to a
//! fresh event bus so stages can be driven directly.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::event_bus::EventBus;
use crate::records::{InMemoryRecordStore, PersistenceError, RecordId, RecordStore, RunRecord};
use crate::runtime::RunConfig;
use crate::service::{
    GenerationRequest, GenerationResponse, GenerationService, GroundingRef, ServiceError,
};
use crate::stage::{Capabilities, Stage, StageContext, StageError, StageUpdate, TaskAssignment};
use crate::state::StateSnapshot;

/// Stage that writes nothing. Useful for wiring-only graph tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStage;

#[async_trait]
impl Stage for NoopStage {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        Ok(StageUpdate::default())
    }
}

/// Capabilities around the given service and a fresh in-memory record store.
#[must_use]
pub fn capabilities(service: Arc<dyn GenerationService>) -> Capabilities {
    Capabilities::new(service, Arc::new(InMemoryRecordStore::new()))
}

/// Context for driving a stage directly, outside any fan-out.
#[must_use]
pub fn stage_context(stage_id: &str, service: Arc<dyn GenerationService>) -> StageContext {
    stage_context_with(stage_id, service, RunConfig::default())
}

/// Like [`stage_context`] with an explicit run configuration.
#[must_use]
pub fn stage_context_with(
    stage_id: &str,
    service: Arc<dyn GenerationService>,
    config: RunConfig,
) -> StageContext {
    // The bus must outlive the emitter or every emit fails with `Closed`;
    // nothing consumes these events, so leaking the bus is the simplest way
    // to keep the channel open for the context's lifetime.
    let bus = EventBus::default();
    let emitter = bus.get_emitter();
    std::mem::forget(bus);
    StageContext {
        stage_id: stage_id.to_string(),
        step: 1,
        task: None,
        config: Arc::new(config),
        caps: capabilities(service),
        event_emitter: emitter,
    }
}

/// Context for driving a stage as a fan-out task with the given params.
#[must_use]
pub fn task_context(
    stage_id: &str,
    ordinal: u32,
    params: Value,
    service: Arc<dyn GenerationService>,
) -> StageContext {
    StageContext {
        task: Some(TaskAssignment { ordinal, params }),
        ..stage_context(stage_id, service)
    }
}

/// Service that answers every call with the same plain text.
#[must_use]
pub fn text_service(text: &str) -> Arc<dyn GenerationService> {
    Arc::new(CannedService(GenerationResponse::from_text(text)))
}

/// Service that answers every call with the same structured payload.
#[must_use]
pub fn structured_service(value: Value) -> Arc<dyn GenerationService> {
    Arc::new(CannedService(GenerationResponse {
        text: value.to_string(),
        structured: Some(value),
        grounding: None,
    }))
}

/// Service that answers every call with the same text and grounding refs,
/// given as `(label, url)` pairs.
#[must_use]
pub fn grounded_service(text: &str, refs: &[(&str, &str)]) -> Arc<dyn GenerationService> {
    Arc::new(CannedService(GenerationResponse {
        text: text.to_string(),
        structured: None,
        grounding: Some(
            refs.iter()
                .map(|(label, url)| GroundingRef::new(label, url))
                .collect(),
        ),
    }))
}

/// Service that fails every call with [`ServiceError::Unavailable`].
#[must_use]
pub fn unavailable_service() -> Arc<dyn GenerationService> {
    Arc::new(UnavailableService)
}

struct CannedService(GenerationResponse);

#[async_trait]
impl GenerationService for CannedService {
    async fn invoke(
        &self,
        _request: GenerationRequest,
    ) -> Result<GenerationResponse, ServiceError> {
        Ok(self.0.clone())
    }
}

struct UnavailableService;

#[async_trait]
impl GenerationService for UnavailableService {
    async fn invoke(
        &self,
        _request: GenerationRequest,
    ) -> Result<GenerationResponse, ServiceError> {
        Err(ServiceError::Unavailable {
            provider: "test",
            message: "scripted outage".to_string(),
        })
    }
}

enum Reply {
    Respond(GenerationResponse),
    Fail(String),
}

struct Rule {
    needle: String,
    reply: Reply,
}

/// Rule-driven generation service for multi-stage scenarios.
///
/// Rules are matched against the request prompt in registration order; the
/// first rule whose needle the prompt contains decides the reply. Matching
/// by content (not call order) keeps behavior deterministic when parallel
/// tasks race to invoke the service. Every request is recorded, so tests can
/// count how often a given stage called out.
///
/// ```
/// # use delvegraph::utils::testing::ScriptedService;
/// # use serde_json::json;
/// let service = ScriptedService::new()
///     .structured_on("critique", json!({"assessment": "fine",
///         "strengths": [], "weaknesses": [], "suggestions": [],
///         "should_revise": false}))
///     .fail_on("quantum")
///     .text_default("draft text");
/// ```
#[derive(Default)]
pub struct ScriptedService {
    rules: Vec<Rule>,
    default: Option<GenerationResponse>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies with `response` to any prompt containing `needle`.
    #[must_use]
    pub fn respond_on(mut self, needle: &str, response: GenerationResponse) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            reply: Reply::Respond(response),
        });
        self
    }

    /// Replies with plain text to any prompt containing `needle`.
    #[must_use]
    pub fn text_on(self, needle: &str, text: &str) -> Self {
        self.respond_on(needle, GenerationResponse::from_text(text))
    }

    /// Replies with a structured payload to any prompt containing `needle`.
    #[must_use]
    pub fn structured_on(self, needle: &str, value: Value) -> Self {
        self.respond_on(
            needle,
            GenerationResponse {
                text: value.to_string(),
                structured: Some(value),
                grounding: None,
            },
        )
    }

    /// Replies with text plus grounding refs to any prompt containing
    /// `needle`.
    #[must_use]
    pub fn grounded_on(self, needle: &str, text: &str, refs: &[(&str, &str)]) -> Self {
        self.respond_on(
            needle,
            GenerationResponse {
                text: text.to_string(),
                structured: None,
                grounding: Some(
                    refs.iter()
                        .map(|(label, url)| GroundingRef::new(label, url))
                        .collect(),
                ),
            },
        )
    }

    /// Fails any prompt containing `needle` with
    /// [`ServiceError::Unavailable`].
    #[must_use]
    pub fn fail_on(mut self, needle: &str) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            reply: Reply::Fail(format!("scripted failure for `{needle}`")),
        });
        self
    }

    /// Fallback reply when no rule matches. Without one, unmatched prompts
    /// fail like an unavailable service.
    #[must_use]
    pub fn text_default(mut self, text: &str) -> Self {
        self.default = Some(GenerationResponse::from_text(text));
        self
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of calls whose prompt contained `needle`.
    #[must_use]
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|request| request.prompt.contains(needle))
            .count()
    }
}

#[async_trait]
impl GenerationService for ScriptedService {
    async fn invoke(&self, request: GenerationRequest) -> Result<GenerationResponse, ServiceError> {
        let prompt = request.prompt.clone();
        self.calls.lock().push(request);

        for rule in &self.rules {
            if prompt.contains(&rule.needle) {
                return match &rule.reply {
                    Reply::Respond(response) => Ok(response.clone()),
                    Reply::Fail(message) => Err(ServiceError::Unavailable {
                        provider: "scripted",
                        message: message.clone(),
                    }),
                };
            }
        }
        self.default
            .clone()
            .ok_or_else(|| ServiceError::Unavailable {
                provider: "scripted",
                message: "no rule matched and no default reply set".to_string(),
            })
    }
}

/// Record store whose every operation fails, for best-effort-persistence
/// tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingRecordStore;

impl FailingRecordStore {
    fn error() -> PersistenceError {
        PersistenceError::Io {
            path: "/dev/full".to_string(),
            source: std::io::Error::other("scripted store failure"),
        }
    }
}

#[async_trait]
impl RecordStore for FailingRecordStore {
    async fn append(&self, _record: RunRecord) -> Result<RecordId, PersistenceError> {
        Err(Self::error())
    }

    async fn recent(
        &self,
        _limit: usize,
        _filter: Option<&str>,
    ) -> Result<Vec<RunRecord>, PersistenceError> {
        Err(Self::error())
    }

    async fn get(&self, _id: RecordId) -> Result<Option<RunRecord>, PersistenceError> {
        Err(Self::error())
    }

    async fn remove(&self, _id: RecordId) -> Result<bool, PersistenceError> {
        Err(Self::error())
    }

    async fn clear(&self) -> Result<usize, PersistenceError> {
        Err(Self::error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_rules_match_in_registration_order() {
        let service = ScriptedService::new()
            .text_on("alpha", "first")
            .fail_on("alpha beta")
            .text_default("fallback");

        let reply = service
            .invoke(GenerationRequest::text("has alpha beta inside"))
            .await
            .unwrap();
        assert_eq!(reply.text, "first");

        let reply = service
            .invoke(GenerationRequest::text("nothing relevant"))
            .await
            .unwrap();
        assert_eq!(reply.text, "fallback");
        assert_eq!(service.calls(), 2);
        assert_eq!(service.calls_matching("alpha"), 1);
    }

    #[tokio::test]
    async fn unmatched_prompt_without_default_is_unavailable() {
        let service = ScriptedService::new().text_on("x", "y");
        let error = service
            .invoke(GenerationRequest::text("unmatched"))
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Unavailable { .. }));
    }
}
