#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strand-executor** – Stateless agent executor contract for the Strand runtime.
//!
//! An executor is a pure function from `(template, configuration, messages,
//! parameters)` to either a single [`ExecutionResult`] or a lazy, finite
//! stream of [`StreamingChunk`]s. A single executor serves every concurrent
//! request; implementations hold no per-conversation state, so two workers
//! may call the same executor with the same inputs at the same time.
//!
//! The crate also provides the template registry, the configuration-schema
//! interpreter, and the reference [`ScriptedExecutor`] used by tests and
//! demos.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use strand_types::{ChatMessage, Metadata, TemplateInfo};

pub mod registry;
pub mod result;
pub mod scripted;
pub mod validation;

pub use registry::TemplateRegistry;
pub use result::{ExecutionResult, FinishReason, StreamingChunk};
pub use scripted::{ScriptedExecutor, ScriptedStep};
pub use validation::validate_configuration;

//─────────────────────────────
//  Errors
//─────────────────────────────

/// Failures an executor can surface outside a well-formed result.
///
/// In-contract failures (an agent template answering with an error) travel
/// inside [`ExecutionResult`]; this type models the escape hatch the worker
/// must map to queue semantics: permanent errors dead-letter the message,
/// transient ones spend the retry budget.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The requested template is not registered. Permanent.
    #[error("template '{0}' not found")]
    TemplateNotFound(String),
    /// The configuration does not satisfy the template schema. Permanent.
    #[error("invalid configuration: {}", .0.join("; "))]
    ConfigInvalid(Vec<String>),
    /// The execution exceeded its time budget. Permanent.
    #[error("execution timed out after {0} seconds")]
    Timeout(u64),
    /// A retryable infrastructure failure (network blip, upstream 5xx).
    #[error("transient executor failure: {0}")]
    Transient(String),
    /// Anything else; treated as permanent.
    #[error("executor failure: {0}")]
    Internal(String),
}

impl ExecutorError {
    /// Whether rejecting the carrying message with requeue is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecutorError::Transient(_))
    }
}

//─────────────────────────────
//  Executor contract
//─────────────────────────────

/// Lazy, finite sequence of streaming chunks.
///
/// `Err` items model mid-stream executor failures; a well-behaved stream
/// yields chunks in strict `chunk_index` order starting at zero, with
/// exactly the final `Ok` chunk carrying a finish reason.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamingChunk, ExecutorError>> + Send>>;

/// Stateless agent execution contract.
///
/// Neither method mutates executor state; concurrent calls with different
/// arguments must not interfere. Implementations are expected to honor the
/// caller's timeout themselves and to surface timeouts through
/// [`ExecutorError::Timeout`] rather than hanging.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Prepare the executor for use. Idempotent.
    async fn initialize(&self) -> Result<(), ExecutorError> {
        Ok(())
    }

    /// Release executor resources. Idempotent.
    async fn shutdown(&self) -> Result<(), ExecutorError> {
        Ok(())
    }

    /// Run one message through a template and return the aggregated result.
    ///
    /// A missing template is reported as
    /// [`ExecutorError::TemplateNotFound`]; an agent-level failure is a
    /// well-formed result with `success = false`.
    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        template_id: &str,
        template_version: &str,
        configuration: &Metadata,
        messages: &[ChatMessage],
        temperature: Option<f64>,
        max_tokens: Option<u32>,
        metadata: Metadata,
    ) -> Result<ExecutionResult, ExecutorError>;

    /// Run one message through a template, producing chunks lazily.
    ///
    /// The stream is always finite. An empty execution still yields one
    /// terminal chunk with empty content and a finish reason; a missing
    /// template yields a single `Err` item.
    #[allow(clippy::too_many_arguments)]
    async fn stream_execute(
        &self,
        template_id: &str,
        template_version: &str,
        configuration: &Metadata,
        messages: &[ChatMessage],
        temperature: Option<f64>,
        max_tokens: Option<u32>,
        metadata: Metadata,
    ) -> ChunkStream;

    /// Check a configuration against the template schema without executing.
    ///
    /// Returns every violation found; an empty list means the configuration
    /// is valid. An unknown template is itself reported as a violation.
    fn validate_configuration(
        &self,
        template_id: &str,
        template_version: &str,
        configuration: &Metadata,
    ) -> Vec<String>;

    /// Templates this executor can run.
    fn supported_templates(&self) -> Vec<TemplateInfo>;
}
