//! Execution result and streaming chunk value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strand_types::Metadata;

/// Why an execution (or a stream) stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// Natural completion.
    #[default]
    Stop,
    /// Output truncated by the token budget.
    Length,
    /// Execution failed.
    Error,
}

/// Aggregated result of one agent message execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the execution succeeded.
    pub success: bool,
    /// Final reply content, when successful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error description, when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why output stopped.
    #[serde(default)]
    pub finish_reason: FinishReason,
    /// Tokens consumed by the prompt.
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens produced in the completion.
    #[serde(default)]
    pub completion_tokens: u32,
    /// Wall-clock processing time.
    #[serde(default)]
    pub processing_time_ms: u64,
    /// Message this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Task the message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Agent that processed the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Broader grouping context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// Result metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// When the result was built.
    pub created_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Successful result carrying the final reply.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            finish_reason: FinishReason::Stop,
            prompt_tokens: 0,
            completion_tokens: 0,
            processing_time_ms: 0,
            message_id: None,
            task_id: None,
            agent_id: None,
            context_id: None,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    /// Failed result carrying the error description.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            finish_reason: FinishReason::Error,
            prompt_tokens: 0,
            completion_tokens: 0,
            processing_time_ms: 0,
            message_id: None,
            task_id: None,
            agent_id: None,
            context_id: None,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    /// Set token accounting.
    pub fn with_tokens(mut self, prompt_tokens: u32, completion_tokens: u32) -> Self {
        self.prompt_tokens = prompt_tokens;
        self.completion_tokens = completion_tokens;
        self
    }

    /// Set wall-clock processing time.
    pub fn with_processing_time_ms(mut self, processing_time_ms: u64) -> Self {
        self.processing_time_ms = processing_time_ms;
        self
    }

    /// Attach metadata, replacing any previous map.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Total tokens consumed: prompt plus completion.
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// One chunk of a streaming execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingChunk {
    /// Chunk text; empty on terminal markers.
    pub content: String,
    /// Zero-based position within the stream.
    pub chunk_index: u32,
    /// Set on the final chunk only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Message this chunk belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Task the message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Agent that produced the chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Broader grouping context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// Chunk metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// When the chunk was produced.
    pub created_at: DateTime<Utc>,
}

impl StreamingChunk {
    /// Chunk of content at the given stream position.
    pub fn new(content: impl Into<String>, chunk_index: u32) -> Self {
        Self {
            content: content.into(),
            chunk_index,
            finish_reason: None,
            message_id: None,
            task_id: None,
            agent_id: None,
            context_id: None,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    /// Mark this chunk as the final one.
    pub fn with_finish_reason(mut self, finish_reason: FinishReason) -> Self {
        self.finish_reason = Some(finish_reason);
        self
    }

    /// Attach metadata, replacing any previous map.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether this chunk terminates the stream.
    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}
