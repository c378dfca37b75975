//! Execution request wire model.
//!
//! An [`ExecutionRequest`] is the payload the orchestrator places on the
//! primary work queue. Field names are normative for the wire format and
//! shared with every queue backend.

use serde::{Deserialize, Serialize};

use strand_queue_core::MessagePriority;
use strand_types::{new_id, AgentId, ChatMessage, Metadata};

/// Default execution timeout when the caller does not supply one.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// Kind of work a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Aggregate execution answered with a single result.
    Execute,
    /// Streaming execution answered chunk by chunk.
    StreamExecute,
    /// Any kind this version does not understand; answered with a failure
    /// result so an unsupported message never wedges the queue.
    #[serde(other)]
    Unknown,
}

/// One atomic execution request, serialized onto the primary queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Identity of this request/response pair.
    pub message_id: String,
    /// Kind of work requested.
    pub message_type: MessageKind,
    /// Agent to execute.
    pub agent_id: AgentId,
    /// Stateful conversation this message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Broader grouping across tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// End user on whose behalf the request runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Conversation turns to execute.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Whether the caller wants chunks instead of one result.
    #[serde(default)]
    pub stream: bool,
    /// Sampling temperature override; wins over the agent default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Completion budget override; wins over the agent default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Request metadata, forwarded to the executor.
    #[serde(default)]
    pub metadata: Metadata,
    /// Execution timeout the executor is expected to honor.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Queue delivery priority.
    #[serde(default)]
    pub priority: MessagePriority,
    /// Opaque correlation id propagated for tracing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Reply queue override; the orchestrator default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl ExecutionRequest {
    /// Create an aggregate execution request with a fresh message id.
    pub fn execute(agent_id: AgentId, messages: Vec<ChatMessage>) -> Self {
        Self::create(agent_id, messages, false)
    }

    /// Create a streaming execution request with a fresh message id.
    pub fn stream(agent_id: AgentId, messages: Vec<ChatMessage>) -> Self {
        Self::create(agent_id, messages, true)
    }

    fn create(agent_id: AgentId, messages: Vec<ChatMessage>, stream: bool) -> Self {
        Self {
            message_id: new_id(),
            message_type: if stream {
                MessageKind::StreamExecute
            } else {
                MessageKind::Execute
            },
            agent_id,
            task_id: None,
            context_id: None,
            user_id: None,
            messages,
            stream,
            temperature: None,
            max_tokens: None,
            metadata: Metadata::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            priority: MessagePriority::Normal,
            correlation_id: None,
            reply_to: None,
        }
    }

    /// Set the task id.
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Set the context id.
    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    /// Set the user id.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Override the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Override the completion budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Attach request metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the delivery priority.
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Route the reply to a caller-owned queue.
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Set the execution timeout.
    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}
