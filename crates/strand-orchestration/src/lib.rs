#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strand-orchestration** – Agent execution orchestrator for the Strand runtime.
//!
//! The orchestrator is the entire single-process scheduling surface: it
//! accepts execution requests, queues them by priority, runs them on a
//! bounded pool of cooperative workers against cached per-conversation
//! agent instances, and plumbs results and chunk streams back to callers.
//!
//! ## Architecture
//!
//! - [`Orchestrator`]: owns the queue, worker pool, instance cache, and
//!   cleanup loop; exposes submit / await / stream.
//! - [`ExecutionRequest`]: the wire model placed on the primary queue.
//! - [`InstanceCache`]: at-most-one live instance per `(agent, task)`
//!   key, with idle eviction and a capacity bound.
//! - Reply and stream payloads cross queues as [`ResultEnvelope`] and
//!   [`ChunkEnvelope`].
//!
//! Queue naming is fixed: `agent.messages` carries work, `agent.results`
//! is the default reply queue, and each streaming execution owns an
//! ephemeral `agent.stream.<message id>` queue deleted by its consumer.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use strand_agents::AgentRepository;
use strand_executor::{AgentExecutor, ExecutionResult, FinishReason, StreamingChunk};
use strand_queue_core::{MessageQueue, SendOptions};
use strand_types::AgentId;

pub mod config;
pub mod envelope;
pub mod error;
pub mod instance;
pub mod request;
mod worker;

pub use config::{build_queue_backend, OrchestratorConfig};
pub use envelope::{ChunkEnvelope, ResultEnvelope};
pub use error::OrchestratorError;
pub use instance::{AgentInstance, InstanceCache, InstanceSummary};
pub use request::{ExecutionRequest, MessageKind, DEFAULT_TIMEOUT_SECONDS};

use worker::{run_worker, WorkerContext};

//─────────────────────────────
//  Queue naming conventions
//─────────────────────────────

/// Primary work queue.
pub const MESSAGE_QUEUE_NAME: &str = "agent.messages";
/// Default reply queue when a request carries no `reply_to`.
pub const RESULT_QUEUE_NAME: &str = "agent.results";
/// Prefix of per-message ephemeral stream queues.
pub const STREAM_QUEUE_PREFIX: &str = "agent.stream.";

/// Per-receive timeout while waiting for stream chunks; silence for this
/// long ends the stream as EOF.
const STREAM_RECEIVE_TIMEOUT_SECONDS: u64 = 30;
/// Per-receive timeout while polling the reply queue in `await_result`.
const RESULT_POLL_TIMEOUT_SECONDS: u64 = 1;

/// Consumer-facing chunk stream returned by
/// [`Orchestrator::stream_results`].
pub type DeliveredChunks = Pin<Box<dyn Stream<Item = StreamingChunk> + Send>>;

//─────────────────────────────
//  Orchestrator
//─────────────────────────────

/// Single-process scheduler over a pluggable message queue.
pub struct Orchestrator {
    queue: Arc<dyn MessageQueue>,
    executor: Arc<dyn AgentExecutor>,
    instances: Arc<InstanceCache>,
    config: OrchestratorConfig,
    /// Results drained off the reply queue, indexed by message id so a
    /// waiter whose result was consumed by another caller still finds it.
    results: Mutex<HashMap<String, ExecutionResult>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Orchestrator {
    /// Create an orchestrator over the given collaborators.
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        repository: Arc<dyn AgentRepository>,
        executor: Arc<dyn AgentExecutor>,
        config: OrchestratorConfig,
    ) -> Self {
        let instances = Arc::new(InstanceCache::new(
            repository,
            config.instance_timeout,
            config.max_instances,
        ));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queue,
            executor,
            instances,
            config,
            results: Mutex::new(HashMap::new()),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Create an orchestrator constructing the queue backend selected by
    /// the configuration.
    pub fn with_default_backend(
        repository: Arc<dyn AgentRepository>,
        executor: Arc<dyn AgentExecutor>,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        let queue = build_queue_backend(config.queue_backend)?;
        Ok(Self::new(queue, repository, executor, config))
    }

    /// Initialize collaborators, create the fixed queues, and spawn the
    /// worker pool and cleanup loop. Calling it again while running is a
    /// no-op.
    pub async fn initialize(&self) -> Result<(), OrchestratorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("initializing orchestrator");

        self.executor.initialize().await?;
        self.queue.initialize().await?;
        self.queue
            .create_queue(MESSAGE_QUEUE_NAME, None, None)
            .await?;
        self.queue
            .create_queue(RESULT_QUEUE_NAME, None, None)
            .await?;

        let _ = self.shutdown_tx.send(false);
        let context = Arc::new(WorkerContext {
            queue: Arc::clone(&self.queue),
            executor: Arc::clone(&self.executor),
            instances: Arc::clone(&self.instances),
        });

        let mut tasks = self.tasks.lock().await;
        for worker_id in 0..self.config.max_workers {
            tasks.push(tokio::spawn(run_worker(
                Arc::clone(&context),
                worker_id,
                self.shutdown_tx.subscribe(),
            )));
        }
        tasks.push(tokio::spawn(run_cleanup(
            Arc::clone(&self.instances),
            self.config.cleanup_interval,
            self.shutdown_tx.subscribe(),
        )));

        info!(workers = self.config.max_workers, "orchestrator initialized");
        Ok(())
    }

    /// Stop workers and the cleanup loop, destroy every instance, and shut
    /// down the queue and executor. Safe to call again; repeated calls are
    /// no-ops.
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!("shutting down orchestrator");

        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(join_error) = task.await {
                warn!(error = %join_error, "orchestrator task ended abnormally");
            }
        }

        self.instances.clear().await;
        self.queue.shutdown().await?;
        self.executor.shutdown().await?;

        info!("orchestrator shutdown complete");
        Ok(())
    }

    /// Enqueue a request on the primary queue. Returns the request's
    /// message id without blocking on execution.
    pub async fn submit(&self, request: &ExecutionRequest) -> Result<String, OrchestratorError> {
        info!(
            message_id = %request.message_id,
            agent_id = %request.agent_id,
            kind = ?request.message_type,
            "submitting execution request"
        );
        let payload = serde_json::to_value(request)?;

        let mut metadata = HashMap::new();
        metadata.insert(
            "message_type".to_string(),
            serde_json::to_value(request.message_type)?,
        );
        metadata.insert(
            "agent_id".to_string(),
            serde_json::Value::String(request.agent_id.to_string()),
        );
        if let Some(task_id) = &request.task_id {
            metadata.insert(
                "task_id".to_string(),
                serde_json::Value::String(task_id.clone()),
            );
        }
        if let Some(context_id) = &request.context_id {
            metadata.insert(
                "context_id".to_string(),
                serde_json::Value::String(context_id.clone()),
            );
        }
        metadata.insert(
            "submitted_at".to_string(),
            serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
        );

        let options = SendOptions {
            priority: request.priority,
            delay_seconds: 0,
            correlation_id: request.correlation_id.clone(),
            reply_to: Some(
                request
                    .reply_to
                    .clone()
                    .unwrap_or_else(|| RESULT_QUEUE_NAME.to_string()),
            ),
            metadata: Some(metadata),
        };
        self.queue
            .send_message(MESSAGE_QUEUE_NAME, payload, options)
            .await?;
        debug!(message_id = %request.message_id, "execution request queued");
        Ok(request.message_id.clone())
    }

    /// Wait for the result of a submitted message.
    ///
    /// Drains the default reply queue: the matching result is returned,
    /// and results for other message ids are acknowledged and cached so
    /// their own waiters find them here instead of on the queue. Returns
    /// `None` when the timeout elapses first; with no timeout it waits
    /// indefinitely.
    pub async fn await_result(
        &self,
        message_id: &str,
        timeout_seconds: Option<u64>,
    ) -> Result<Option<ExecutionResult>, OrchestratorError> {
        let deadline =
            timeout_seconds.map(|seconds| Instant::now() + Duration::from_secs(seconds));
        loop {
            if let Some(result) = self.results.lock().await.get(message_id) {
                return Ok(Some(result.clone()));
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
            }

            let Some(message) = self
                .queue
                .receive_message(RESULT_QUEUE_NAME, Some(RESULT_POLL_TIMEOUT_SECONDS))
                .await?
            else {
                continue;
            };
            match serde_json::from_value::<ResultEnvelope>(message.payload.clone()) {
                Ok(result_envelope) => {
                    self.queue.acknowledge_message(&message).await?;
                    let result = result_envelope.into_result();
                    let result_id = result.message_id.clone().unwrap_or_default();
                    if result_id == message_id {
                        self.results
                            .lock()
                            .await
                            .insert(result_id, result.clone());
                        return Ok(Some(result));
                    }
                    debug!(
                        message_id = %result_id,
                        "caching result drained for another waiter"
                    );
                    self.results.lock().await.insert(result_id, result);
                }
                Err(decode_error) => {
                    warn!(error = %decode_error, "discarding undecodable reply-queue message");
                    self.queue.acknowledge_message(&message).await?;
                }
            }
        }
    }

    /// Consume the chunk stream of a streaming execution.
    ///
    /// Yields chunks in order until the end marker is observed; error
    /// markers are yielded (with `finish_reason = error`) before the
    /// stream terminates. Silence longer than the per-receive timeout
    /// ends the stream as EOF. The ephemeral stream queue is deleted on
    /// termination.
    pub fn stream_results(&self, message_id: &str) -> DeliveredChunks {
        let queue = Arc::clone(&self.queue);
        let stream_queue = format!("{STREAM_QUEUE_PREFIX}{message_id}");
        debug!(queue = %stream_queue, "consuming stream results");

        Box::pin(stream! {
            loop {
                let received = queue
                    .receive_message(&stream_queue, Some(STREAM_RECEIVE_TIMEOUT_SECONDS))
                    .await;
                let message = match received {
                    Ok(Some(message)) => message,
                    Ok(None) => break,
                    Err(receive_error) => {
                        warn!(error = %receive_error, queue = %stream_queue, "stream receive failed");
                        break;
                    }
                };
                let chunk_envelope =
                    match serde_json::from_value::<ChunkEnvelope>(message.payload.clone()) {
                        Ok(chunk_envelope) => chunk_envelope,
                        Err(decode_error) => {
                            warn!(error = %decode_error, "discarding undecodable stream message");
                            let _ = queue.acknowledge_message(&message).await;
                            continue;
                        }
                    };
                let _ = queue.acknowledge_message(&message).await;

                let is_end = chunk_envelope.is_stream_end();
                let is_error = chunk_envelope.finish_reason == Some(FinishReason::Error);
                if is_end && !is_error {
                    break;
                }
                yield chunk_envelope.into_chunk();
                if is_end {
                    break;
                }
            }
            let _ = queue.delete_queue(&stream_queue).await;
        })
    }

    /// Summaries of every live agent instance.
    pub async fn list_instances(&self) -> Vec<InstanceSummary> {
        self.instances.list().await
    }

    /// Destroy one cached instance; returns `false` if none was live.
    pub async fn destroy_instance(&self, agent_id: &AgentId, task_id: Option<&str>) -> bool {
        self.instances.destroy(agent_id, task_id).await
    }

    /// Whether the orchestrator is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Periodic instance-cache cleanup until shutdown.
async fn run_cleanup(
    instances: Arc<InstanceCache>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("cleanup worker started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if *shutdown.borrow() {
            break;
        }
        let evicted = instances.cleanup().await;
        if evicted > 0 {
            info!(evicted, "cleanup pass destroyed inactive instances");
        } else {
            debug!("cleanup pass found nothing to evict");
        }
    }
    info!("cleanup worker stopped");
}

// Integration coverage for the orchestrator lives in `tests/orchestrator.rs`.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_are_fixed() {
        assert_eq!(MESSAGE_QUEUE_NAME, "agent.messages");
        assert_eq!(RESULT_QUEUE_NAME, "agent.results");
        assert_eq!(STREAM_QUEUE_PREFIX, "agent.stream.");
    }

    #[test]
    fn orchestrator_handles_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<OrchestratorError>();
        assert_send::<Orchestrator>();
    }
}
