//! Generation service boundary.
//!
//! Every natural-language call a stage makes goes through the
//! [`GenerationService`] trait. The engine treats the service as an opaque
//! function: prompt in, text (plus optional structured JSON and grounding
//! references) out. Services are injected through
//! [`StageContext`](crate::stage::StageContext), never reached through
//! process-wide globals, so tests substitute scripted implementations freely
//! (see [`utils::testing`](crate::utils::testing)).
//!
//! Failure policy: stages that can degrade do so locally with
//! [`FALLBACK_TEXT`] (or a typed fallback value) instead of propagating, so a
//! single failing call never aborts a whole fan-out. See the error docs on
//! [`ServiceError`].

use async_trait::async_trait;
use miette::Diagnostic;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Fixed fallback inserted wherever a generation call could not produce a
/// usable result.
pub const FALLBACK_TEXT: &str = "no relevant information found";

/// A single generation request.
///
/// Constructed through [`text`](Self::text), [`structured`](Self::structured)
/// or [`grounded`](Self::grounded); the fluent `with_*` methods refine it.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    /// Name of the structured shape the caller expects back, if any.
    pub structured: Option<&'static str>,
    /// Whether the service should ground the answer in retrieved sources.
    pub grounded: bool,
}

impl GenerationRequest {
    /// Plain text completion.
    #[must_use]
    pub fn text(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            system: None,
            model: None,
            temperature: None,
            structured: None,
            grounded: false,
        }
    }

    /// Completion expected to carry structured JSON of the named shape.
    #[must_use]
    pub fn structured(prompt: &str, expected: &'static str) -> Self {
        Self {
            structured: Some(expected),
            ..Self::text(prompt)
        }
    }

    /// Completion expected to carry grounding references.
    #[must_use]
    pub fn grounded(prompt: &str) -> Self {
        Self {
            grounded: true,
            ..Self::text(prompt)
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: &str) -> Self {
        self.system = Some(system.to_string());
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A retrieved source reference attached to a grounded response.
///
/// Absence of grounding is a valid response, not an error; stages that want
/// sources must tolerate an empty or missing list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroundingRef {
    pub label: String,
    pub url: String,
}

impl GroundingRef {
    #[must_use]
    pub fn new(label: &str, url: &str) -> Self {
        Self {
            label: label.to_string(),
            url: url.to_string(),
        }
    }
}

/// What a generation call returned.
#[derive(Clone, Debug, Default)]
pub struct GenerationResponse {
    pub text: String,
    pub structured: Option<Value>,
    pub grounding: Option<Vec<GroundingRef>>,
}

impl GenerationResponse {
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    /// Decodes the structured payload into the caller's expected type.
    ///
    /// A missing or non-conforming payload is a [`ServiceError::SchemaMismatch`],
    /// which callers handle with the same local-fallback policy as an
    /// unreachable service.
    pub fn structured_as<T: DeserializeOwned>(
        &self,
        expected: &'static str,
    ) -> Result<T, ServiceError> {
        let value = self
            .structured
            .as_ref()
            .ok_or(ServiceError::SchemaMismatch {
                expected,
                detail: "response carried no structured payload".to_string(),
            })?;
        serde_json::from_value(value.clone()).map_err(|e| ServiceError::SchemaMismatch {
            expected,
            detail: e.to_string(),
        })
    }

    /// Grounding references, empty when the service provided none.
    #[must_use]
    pub fn grounding_refs(&self) -> &[GroundingRef] {
        self.grounding.as_deref().unwrap_or(&[])
    }
}

/// Errors a generation call can surface.
#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    /// The collaborator was unreachable or failed outright.
    #[error("generation service unavailable ({provider}): {message}")]
    #[diagnostic(
        code(delvegraph::service::unavailable),
        help("calling stages degrade to the fixed fallback text instead of failing the run")
    )]
    Unavailable {
        provider: &'static str,
        message: String,
    },

    /// The collaborator answered, but not in the expected structured shape.
    #[error("structured output did not match expected shape `{expected}`: {detail}")]
    #[diagnostic(
        code(delvegraph::service::schema_mismatch),
        help("treated like an unavailable service: the calling stage substitutes its fallback value")
    )]
    SchemaMismatch {
        expected: &'static str,
        detail: String,
    },

    /// The call exceeded its time budget.
    #[error("generation call timed out after {seconds}s")]
    #[diagnostic(code(delvegraph::service::timeout))]
    Timeout { seconds: u64 },
}

/// The generation collaborator interface.
///
/// Implementations must be cheap to clone behind an `Arc` and safe to call
/// concurrently: parallel research tasks all invoke the same service.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn invoke(&self, request: GenerationRequest) -> Result<GenerationResponse, ServiceError>;
}
