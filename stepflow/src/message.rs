//! Conversation turns carried in the workflow state.
//!
//! The planner embeds the most recent turns in its prompt; resuming after a clarification
//! question appends the question and the user's reply.

use serde::{Deserialize, Serialize};

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "lowercase")]
pub enum Message {
    /// User input.
    User(String),
    /// Agent reply.
    Assistant(String),
}

impl Message {
    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User(content.into())
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(content.into())
    }

    pub fn role(&self) -> &'static str {
        match self {
            Message::User(_) => "user",
            Message::Assistant(_) => "assistant",
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::User(s) | Message::Assistant(s) => s,
        }
    }
}
