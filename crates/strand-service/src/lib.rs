#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strand-service** – Execute-agent use case for the Strand runtime.
//!
//! The transactional seam between external command surfaces (HTTP, CLI,
//! SDK clients) and the orchestrator. The service validates commands, owns
//! identifier generation and default task ids, submits requests, and
//! either awaits the aggregated result or forwards the chunk stream. A
//! caller always gets a well-formed result or a terminated stream, never a
//! raised error from the core.

use std::sync::Arc;

use tracing::{debug, info, warn};

use strand_executor::ExecutionResult;
use strand_orchestration::{
    DeliveredChunks, ExecutionRequest, Orchestrator, OrchestratorError, DEFAULT_TIMEOUT_SECONDS,
};
use strand_queue_core::MessagePriority;
use strand_types::{new_id, AgentId, ChatMessage, Metadata};

//─────────────────────────────
//  Errors
//─────────────────────────────

/// Errors surfaced by the execute-agent use case.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The command carried an empty agent id.
    #[error("agent id cannot be empty")]
    EmptyAgentId,
    /// The command carried no messages.
    #[error("at least one message is required")]
    NoMessages,
    /// The command temperature is outside `[0.0, 2.0]`.
    #[error("temperature must be between 0.0 and 2.0, got {0}")]
    TemperatureOutOfRange(f64),
    /// The command `max_tokens` is zero.
    #[error("max_tokens must be positive")]
    MaxTokensZero,
    /// The orchestrator refused the submission.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

//─────────────────────────────
//  Command
//─────────────────────────────

/// Intent to execute an agent with a sequence of messages.
#[derive(Debug, Clone)]
pub struct ExecuteCommand {
    /// Agent to execute.
    pub agent_id: AgentId,
    /// Conversation turns to execute; never empty for a valid command.
    pub messages: Vec<ChatMessage>,
    /// Conversation to continue; a fresh one is started when absent.
    pub task_id: Option<String>,
    /// Broader grouping context.
    pub context_id: Option<String>,
    /// End user on whose behalf the command runs.
    pub user_id: Option<String>,
    /// Sampling temperature override.
    pub temperature: Option<f64>,
    /// Completion budget override.
    pub max_tokens: Option<u32>,
    /// Command metadata, forwarded to the executor.
    pub metadata: Metadata,
    /// Execution timeout; the orchestrator default applies when absent.
    pub timeout_seconds: Option<u64>,
    /// Queue delivery priority.
    pub priority: MessagePriority,
    /// Opaque correlation id; a fresh one is minted when absent.
    pub correlation_id: Option<String>,
}

impl ExecuteCommand {
    /// Create a command for the given agent and messages.
    pub fn new(agent_id: AgentId, messages: Vec<ChatMessage>) -> Self {
        Self {
            agent_id,
            messages,
            task_id: None,
            context_id: None,
            user_id: None,
            temperature: None,
            max_tokens: None,
            metadata: Metadata::new(),
            timeout_seconds: None,
            priority: MessagePriority::Normal,
            correlation_id: None,
        }
    }

    /// Continue an existing conversation.
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
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

    /// Set the delivery priority.
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the execution timeout.
    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// Check the command invariants.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.agent_id.as_str().is_empty() {
            return Err(ServiceError::EmptyAgentId);
        }
        if self.messages.is_empty() {
            return Err(ServiceError::NoMessages);
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ServiceError::TemperatureOutOfRange(temperature));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ServiceError::MaxTokensZero);
        }
        Ok(())
    }
}

//─────────────────────────────
//  Service
//─────────────────────────────

/// Application service driving agent executions through the orchestrator.
pub struct ExecuteAgentService {
    orchestrator: Arc<Orchestrator>,
}

impl ExecuteAgentService {
    /// Create a service over a running orchestrator.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Execute an agent and wait for the aggregated result.
    ///
    /// The caller always receives an [`ExecutionResult`]: failures arrive
    /// with `success = false`, and an expired wait is answered with a
    /// synthesized timeout result.
    pub async fn execute(&self, command: ExecuteCommand) -> Result<ExecutionResult, ServiceError> {
        command.validate()?;
        let request = self.build_request(command, false);
        info!(
            message_id = %request.message_id,
            agent_id = %request.agent_id,
            task_id = ?request.task_id,
            "executing agent"
        );

        let timeout_seconds = request.timeout_seconds;
        let message_id = self.orchestrator.submit(&request).await?;
        match self
            .orchestrator
            .await_result(&message_id, Some(timeout_seconds))
            .await?
        {
            Some(result) => {
                info!(
                    message_id = %message_id,
                    success = result.success,
                    "agent execution completed"
                );
                Ok(result)
            }
            None => {
                warn!(message_id = %message_id, timeout_seconds, "agent execution timed out");
                Ok(timeout_result(&request))
            }
        }
    }

    /// Execute an agent and forward its chunk stream to the caller.
    ///
    /// Chunks with `finish_reason = error` are forwarded as-is; the stream
    /// always terminates, either naturally or with such an error chunk.
    pub async fn execute_streaming(
        &self,
        command: ExecuteCommand,
    ) -> Result<DeliveredChunks, ServiceError> {
        command.validate()?;
        let request = self.build_request(command, true);
        info!(
            message_id = %request.message_id,
            agent_id = %request.agent_id,
            task_id = ?request.task_id,
            "executing agent with streaming"
        );

        let message_id = self.orchestrator.submit(&request).await?;
        Ok(self.orchestrator.stream_results(&message_id))
    }

    fn build_request(&self, command: ExecuteCommand, stream: bool) -> ExecutionRequest {
        let task_id = command.task_id.unwrap_or_else(|| {
            let task_id = new_id();
            debug!(task_id = %task_id, "assigned fresh task id");
            task_id
        });
        let correlation_id = command.correlation_id.unwrap_or_else(new_id);

        let mut request = if stream {
            ExecutionRequest::stream(command.agent_id, command.messages)
        } else {
            ExecutionRequest::execute(command.agent_id, command.messages)
        };
        request = request
            .with_task_id(task_id)
            .with_correlation_id(correlation_id)
            .with_priority(command.priority)
            .with_metadata(command.metadata)
            .with_timeout_seconds(command.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS));
        if let Some(context_id) = command.context_id {
            request = request.with_context_id(context_id);
        }
        if let Some(user_id) = command.user_id {
            request = request.with_user_id(user_id);
        }
        if let Some(temperature) = command.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = command.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }
}

/// Synthesized result for a wait that outlived its timeout.
fn timeout_result(request: &ExecutionRequest) -> ExecutionResult {
    let mut result = ExecutionResult::failure("await timeout");
    result.message_id = Some(request.message_id.clone());
    result.task_id = request.task_id.clone();
    result.agent_id = Some(request.agent_id.to_string());
    result.context_id = request.context_id.clone();
    result
}
