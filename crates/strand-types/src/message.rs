//! Chat message value object.
//!
//! A [`ChatMessage`] is one turn in a conversation: a role plus non-empty
//! content. Messages are immutable once constructed and serialize with the
//! wire field names consumed by queue payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Metadata, ValidationError};

/// Role of a single conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction injected ahead of the conversation.
    System,
    /// Message authored by the end user.
    User,
    /// Message produced by the agent.
    Assistant,
    /// Output of a tool invocation fed back into the conversation.
    Tool,
}

/// One immutable turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who authored this turn.
    pub role: MessageRole,
    /// Message text; never empty.
    pub content: String,
    /// When the message was produced.
    pub timestamp: DateTime<Utc>,
    /// Opaque per-message metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl ChatMessage {
    /// Create a message, rejecting empty content.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Result<Self, ValidationError> {
        let content = content.into();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        Ok(Self {
            role,
            content,
            timestamp: Utc::now(),
            metadata: Metadata::new(),
        })
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(MessageRole::System, content)
    }

    /// Attach metadata, replacing any previously attached map.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether this is a user turn.
    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    /// Whether this is an assistant turn.
    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }
}
