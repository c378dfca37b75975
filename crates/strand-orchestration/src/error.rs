//! Orchestrator error types.

use strand_agents::RepositoryError;
use strand_executor::ExecutorError;
use strand_queue_core::QueueError;
use strand_types::AgentId;

/// Errors surfaced by orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The requested agent does not exist in the repository.
    #[error("agent {0} not found")]
    AgentNotFound(AgentId),
    /// The queue backend failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// The executor failed outside a well-formed result.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    /// The agent repository failed for a reason other than a missing record.
    #[error("repository failure: {0}")]
    Repository(String),
    /// A payload could not be encoded or decoded.
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RepositoryError> for OrchestratorError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::AgentNotFound(id) => OrchestratorError::AgentNotFound(id),
            RepositoryError::Backend(message) => OrchestratorError::Repository(message),
        }
    }
}
