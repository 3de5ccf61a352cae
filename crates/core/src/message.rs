//! Message and conversation memory types.
//!
//! These are the value objects replayed into every model invocation:
//! user sends a message → engine composes a prompt from the session's
//! [`ConversationMemory`] → provider generates a reply → the exchange is
//! appended back to memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (or the engine speaking on their behalf, e.g. follow-ups)
    User,
    /// The AI assistant
    Assistant,
    /// System instructions (preamble, profile)
    System,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }
}

/// Ordered, append-only log of user/assistant turns for one session.
///
/// Turns are replayed verbatim, in insertion order, into every prompt.
/// Nothing in the engine rewrites or truncates a memory once written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationMemory {
    turns: Vec<Message>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one completed exchange: the prompt text and the model's reply.
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push(Message::user(user));
        self.turns.push(Message::assistant(assistant));
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[Message] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Rough token estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.turns.iter().map(|m| m.content.len() / 4).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
    }

    #[test]
    fn memory_preserves_insertion_order() {
        let mut memory = ConversationMemory::new();
        memory.push_exchange("first question", "first answer");
        memory.push_exchange("second question", "second answer");

        let contents: Vec<&str> = memory.turns().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["first question", "first answer", "second question", "second answer"]
        );
        assert_eq!(memory.turns()[0].role, Role::User);
        assert_eq!(memory.turns()[1].role, Role::Assistant);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, r#""assistant""#);
    }

    #[test]
    fn memory_token_estimate() {
        let mut memory = ConversationMemory::new();
        // 20 chars + 8 chars ≈ 5 + 2 tokens
        memory.push_exchange("12345678901234567890", "12345678");
        assert_eq!(memory.estimated_tokens(), 7);
    }
}
