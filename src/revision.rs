//! Bounded-loop policies: the revision controller and the search budget.
//!
//! Two cycles exist in the shipped pipeline and both must provably
//! terminate:
//!
//! - the **revision loop** (`critique -> revise -> critique`), bounded by a
//!   fixed ceiling ([`REVISION_CEILING`]);
//! - the **search loop** (`reflect -> expand -> join -> reflect`), bounded by
//!   [`RunConfig::max_search_passes`](crate::runtime::RunConfig), which is
//!   read from config on every pass rather than captured at graph build.
//!
//! The ceiling is enforced at two independent points: inside the critique
//! stage (it clamps its own verdict via [`RevisionPolicy::clamp_verdict`])
//! and inside the back-edge router ([`RevisionPolicy::decide`]). A counter
//! observed past its bound means both enforcement points were bypassed, so
//! [`CeilingViolation`] aborts the run instead of being tolerated.
//!
//! Policies are pure. Emission of the corresponding loop events happens at
//! the call sites that hold an emitter.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fixed maximum number of revision passes per run.
pub const REVISION_CEILING: u32 = 1;

/// Loop label used in events and violations for the revision controller.
pub const REVISION_LOOP: &str = "revision";

/// Loop label used in events and violations for the bounded search loop.
pub const SEARCH_LOOP: &str = "search";

/// A bounded-loop counter exceeded its bound.
///
/// This is an invariant violation, not a data problem: it can only happen if
/// counter propagation was corrupted or a loop stage was invoked out of
/// contract. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("{loop_name} loop exceeded its ceiling: counter {count}, bound {ceiling}")]
#[diagnostic(
    code(delvegraph::revision::ceiling_violation),
    help("both enforcement points were bypassed; inspect how the counter field was propagated")
)]
pub struct CeilingViolation {
    pub loop_name: &'static str,
    pub count: u32,
    pub ceiling: u32,
}

/// Outcome of a revision-controller decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionDecision {
    Revise,
    Finalize,
}

impl fmt::Display for RevisionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionDecision::Revise => write!(f, "revise"),
            RevisionDecision::Finalize => write!(f, "finalize"),
        }
    }
}

/// The revision controller's ceiling and decision rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RevisionPolicy {
    ceiling: u32,
}

impl Default for RevisionPolicy {
    fn default() -> Self {
        Self {
            ceiling: REVISION_CEILING,
        }
    }
}

impl RevisionPolicy {
    /// Policy with a non-default ceiling. Production uses [`Default`].
    #[must_use]
    pub fn new(ceiling: u32) -> Self {
        Self { ceiling }
    }

    #[must_use]
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Critique-side enforcement: the verdict a critique stage may store.
    ///
    /// Once the counter reaches the ceiling the verdict is `false` no matter
    /// what the assessment concluded.
    #[must_use]
    pub fn clamp_verdict(&self, should_revise: bool, revision_count: u32) -> bool {
        should_revise && revision_count < self.ceiling
    }

    /// Router-side enforcement: where the back-edge goes.
    #[must_use]
    pub fn decide(&self, should_revise: bool, revision_count: u32) -> RevisionDecision {
        if should_revise && revision_count < self.ceiling {
            RevisionDecision::Revise
        } else {
            RevisionDecision::Finalize
        }
    }

    /// Assertion for the revise stage itself: running at or past the ceiling
    /// means both enforcement points failed.
    pub fn ensure_can_revise(&self, revision_count: u32) -> Result<(), CeilingViolation> {
        if revision_count >= self.ceiling {
            return Err(CeilingViolation {
                loop_name: REVISION_LOOP,
                count: revision_count,
                ceiling: self.ceiling,
            });
        }
        Ok(())
    }
}

/// Outcome of a search-loop decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchDecision {
    Expand,
    Conclude,
}

impl fmt::Display for SearchDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchDecision::Expand => write!(f, "expand"),
            SearchDecision::Conclude => write!(f, "conclude"),
        }
    }
}

/// Decision rules for the bounded search loop.
///
/// Stateless on purpose: the pass bound lives in run config and is passed in
/// fresh on every decision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchPolicy;

impl SearchPolicy {
    /// Expand only while the verdict is insufficient and passes remain.
    #[must_use]
    pub fn decide(is_sufficient: bool, loop_count: u32, max_passes: u32) -> SearchDecision {
        if is_sufficient || loop_count >= max_passes {
            SearchDecision::Conclude
        } else {
            SearchDecision::Expand
        }
    }

    /// Assertion for the expansion stage: expanding at or past the bound is
    /// a violation.
    pub fn ensure_can_expand(loop_count: u32, max_passes: u32) -> Result<(), CeilingViolation> {
        if loop_count >= max_passes {
            return Err(CeilingViolation {
                loop_name: SEARCH_LOOP,
                count: loop_count,
                ceiling: max_passes,
            });
        }
        Ok(())
    }
}
