//! Conversation messages threaded through a run.
//!
//! The first user message of a run carries the research question; stages
//! append assistant messages describing what they produced. Messages
//! accumulate under the append policy of
//! [`Field::Messages`](crate::types::Field::Messages).

use serde::{Deserialize, Serialize};

/// A single role-tagged message.
///
/// Roles are plain strings so transcripts serialize cleanly; the associated
/// constants cover the roles this crate produces.
///
/// # Examples
///
/// ```
/// use delvegraph::message::Message;
///
/// let question = Message::user("What changed in Rust 1.89?");
/// assert_eq!(question.role, Message::USER);
/// assert!(question.has_role(Message::USER));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub const USER: &'static str = "user";
    pub const ASSISTANT: &'static str = "assistant";
    pub const SYSTEM: &'static str = "system";

    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}
