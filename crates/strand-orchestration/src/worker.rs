//! Worker pool internals.
//!
//! Each worker drains the primary queue, dispatches requests to the
//! executor through the instance cache, and answers on the reply queue.
//! A worker never lets a failure escape its loop: every error becomes a
//! well-formed result on the reply queue (and, for streams, a terminal
//! error marker on the stream queue) before the primary message is
//! acknowledged or rejected.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use strand_executor::{AgentExecutor, ExecutionResult};
use strand_queue_core::{MessagePriority, MessageQueue, QueueMessage, SendOptions};
use strand_types::Metadata;

use crate::envelope::{ChunkEnvelope, ResultEnvelope};
use crate::error::OrchestratorError;
use crate::instance::{AgentInstance, InstanceCache};
use crate::request::{ExecutionRequest, MessageKind};
use crate::{MESSAGE_QUEUE_NAME, RESULT_QUEUE_NAME, STREAM_QUEUE_PREFIX};

/// How long a worker blocks on the primary queue per receive.
const WORKER_RECEIVE_TIMEOUT_SECONDS: u64 = 5;
/// Back-off after a queue-level receive failure.
const WORKER_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Shared handles a worker needs to process messages.
pub(crate) struct WorkerContext {
    pub(crate) queue: Arc<dyn MessageQueue>,
    pub(crate) executor: Arc<dyn AgentExecutor>,
    pub(crate) instances: Arc<InstanceCache>,
}

/// Worker loop: drain the primary queue until shutdown.
pub(crate) async fn run_worker(
    ctx: Arc<WorkerContext>,
    worker_id: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(worker_id, "message worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let received = tokio::select! {
            _ = shutdown.changed() => break,
            received = ctx.queue.receive_message(
                MESSAGE_QUEUE_NAME,
                Some(WORKER_RECEIVE_TIMEOUT_SECONDS),
            ) => received,
        };
        match received {
            Ok(Some(message)) => process_message(&ctx, message).await,
            Ok(None) => continue,
            Err(queue_error) => {
                error!(worker_id, error = %queue_error, "worker receive failed");
                tokio::time::sleep(WORKER_ERROR_BACKOFF).await;
            }
        }
    }
    info!(worker_id, "message worker stopped");
}

/// Process one primary-queue message end to end.
async fn process_message(ctx: &WorkerContext, message: QueueMessage) {
    let request: ExecutionRequest = match serde_json::from_value(message.payload.clone()) {
        Ok(request) => request,
        Err(decode_error) => {
            error!(
                message_id = %message.id,
                error = %decode_error,
                "failed to decode execution request"
            );
            let reason = format!("undecodable payload: {decode_error}");
            let _ = ctx.queue.reject_message(&message, false, Some(reason)).await;
            return;
        }
    };
    debug!(
        message_id = %request.message_id,
        agent_id = %request.agent_id,
        kind = ?request.message_type,
        "worker processing message"
    );

    let outcome = match request.message_type {
        MessageKind::Execute => execute_request(ctx, &request).await,
        MessageKind::StreamExecute => stream_request(ctx, &request).await,
        MessageKind::Unknown => {
            warn!(message_id = %request.message_id, "unsupported message type");
            let mut result = ExecutionResult::failure("unsupported message type");
            stamp_identifiers(&mut result, &request);
            send_result(ctx, &message, result).await;
            let _ = ctx.queue.acknowledge_message(&message).await;
            return;
        }
    };

    match outcome {
        Ok(result) => {
            send_result(ctx, &message, result).await;
            let _ = ctx.queue.acknowledge_message(&message).await;
        }
        Err(failure) => {
            error!(
                message_id = %request.message_id,
                error = %failure,
                "message execution failed"
            );
            let mut result = ExecutionResult::failure(failure.to_string());
            stamp_identifiers(&mut result, &request);
            send_result(ctx, &message, result).await;
            dispose_failed(ctx, &message, &failure).await;
        }
    }
}

/// Map a failure to queue disposition per the error taxonomy: missing
/// agents are permanent and acknowledged, transient executor failures
/// spend the retry budget, everything else dead-letters.
async fn dispose_failed(ctx: &WorkerContext, message: &QueueMessage, failure: &OrchestratorError) {
    match failure {
        OrchestratorError::AgentNotFound(_) => {
            let _ = ctx.queue.acknowledge_message(message).await;
        }
        OrchestratorError::Executor(executor_error) if executor_error.is_transient() => {
            let _ = ctx
                .queue
                .reject_message(message, true, Some(failure.to_string()))
                .await;
        }
        _ => {
            let _ = ctx
                .queue
                .reject_message(message, false, Some(failure.to_string()))
                .await;
        }
    }
}

/// Run an aggregate execution and build the outgoing result.
async fn execute_request(
    ctx: &WorkerContext,
    request: &ExecutionRequest,
) -> Result<ExecutionResult, OrchestratorError> {
    let started = Instant::now();
    let instance = ctx
        .instances
        .get_or_create(&request.agent_id, request.task_id.as_deref())
        .await?;
    let (temperature, max_tokens) = resolve_parameters(&instance, request);
    let configuration = instance.agent.template_configuration();
    let metadata = execution_metadata(&instance, request);

    let mut result = ctx
        .executor
        .execute(
            &instance.agent.template_id,
            instance.agent.template_version_or_default(),
            &configuration,
            &request.messages,
            temperature,
            max_tokens,
            metadata,
        )
        .await?;

    result.processing_time_ms = started.elapsed().as_millis() as u64;
    stamp_identifiers(&mut result, request);
    annotate_result(&mut result, &instance, request);
    Ok(result)
}

/// Run a streaming execution: forward chunks onto the per-message stream
/// queue, terminate it with a marker, and summarize on the reply queue.
async fn stream_request(
    ctx: &WorkerContext,
    request: &ExecutionRequest,
) -> Result<ExecutionResult, OrchestratorError> {
    let started = Instant::now();
    let stream_queue = format!("{STREAM_QUEUE_PREFIX}{}", request.message_id);
    ctx.queue.create_queue(&stream_queue, None, None).await?;
    debug!(queue = %stream_queue, "created stream queue");

    let instance = match ctx
        .instances
        .get_or_create(&request.agent_id, request.task_id.as_deref())
        .await
    {
        Ok(instance) => instance,
        Err(failure) => {
            send_error_marker(ctx, &stream_queue, request, 0, &failure.to_string()).await;
            return Err(failure);
        }
    };
    let (temperature, max_tokens) = resolve_parameters(&instance, request);
    let configuration = instance.agent.template_configuration();
    let metadata = execution_metadata(&instance, request);

    let mut chunks = ctx
        .executor
        .stream_execute(
            &instance.agent.template_id,
            instance.agent.template_version_or_default(),
            &configuration,
            &request.messages,
            temperature,
            max_tokens,
            metadata,
        )
        .await;

    let mut chunk_count: u32 = 0;
    while let Some(item) = chunks.next().await {
        match item {
            Ok(chunk) => {
                debug!(
                    chunk_index = chunk.chunk_index,
                    content_len = chunk.content.len(),
                    finish = ?chunk.finish_reason,
                    "forwarding stream chunk"
                );
                let envelope = ChunkEnvelope::from_chunk(
                    &chunk,
                    &request.message_id,
                    request.task_id.as_deref(),
                    request.agent_id.as_str(),
                    request.context_id.as_deref(),
                );
                let payload = serde_json::to_value(&envelope)?;
                if let Err(send_error) = ctx
                    .queue
                    .send_message(
                        &stream_queue,
                        payload,
                        SendOptions::with_priority(MessagePriority::High),
                    )
                    .await
                {
                    let failure = OrchestratorError::from(send_error);
                    send_error_marker(ctx, &stream_queue, request, chunk_count, &failure.to_string())
                        .await;
                    return Err(failure);
                }
                chunk_count += 1;
            }
            Err(executor_error) => {
                warn!(
                    message_id = %request.message_id,
                    error = %executor_error,
                    "executor failed mid-stream"
                );
                send_error_marker(
                    ctx,
                    &stream_queue,
                    request,
                    chunk_count,
                    &executor_error.to_string(),
                )
                .await;
                return Err(executor_error.into());
            }
        }
    }

    let marker = ChunkEnvelope::end_marker(
        &request.message_id,
        request.task_id.as_deref(),
        request.agent_id.as_str(),
        request.context_id.as_deref(),
        chunk_count,
    );
    let payload = serde_json::to_value(&marker)?;
    ctx.queue
        .send_message(
            &stream_queue,
            payload,
            SendOptions::with_priority(MessagePriority::High),
        )
        .await?;
    info!(
        message_id = %request.message_id,
        chunk_count,
        "stream execution completed"
    );

    let mut result = ExecutionResult::success(format!(
        "Streaming completed with {chunk_count} chunks"
    ))
    .with_processing_time_ms(started.elapsed().as_millis() as u64);
    stamp_identifiers(&mut result, request);
    annotate_result(&mut result, &instance, request);
    result
        .metadata
        .insert("stream_queue".to_string(), Value::String(stream_queue));
    result
        .metadata
        .insert("chunk_count".to_string(), Value::from(chunk_count));
    Ok(result)
}

/// Best-effort terminal error marker so a stream consumer is not left
/// waiting out its receive timeout.
async fn send_error_marker(
    ctx: &WorkerContext,
    stream_queue: &str,
    request: &ExecutionRequest,
    chunk_index: u32,
    error: &str,
) {
    let marker = ChunkEnvelope::error_marker(
        &request.message_id,
        request.task_id.as_deref(),
        request.agent_id.as_str(),
        request.context_id.as_deref(),
        chunk_index,
        error,
    );
    let payload = match serde_json::to_value(&marker) {
        Ok(payload) => payload,
        Err(encode_error) => {
            error!(error = %encode_error, "failed to encode stream error marker");
            return;
        }
    };
    if let Err(send_error) = ctx
        .queue
        .send_message(
            stream_queue,
            payload,
            SendOptions::with_priority(MessagePriority::High),
        )
        .await
    {
        error!(error = %send_error, queue = stream_queue, "failed to send stream error marker");
    }
}

/// Send a result envelope to the message's reply queue.
async fn send_result(ctx: &WorkerContext, original: &QueueMessage, result: ExecutionResult) {
    let reply_to = original
        .reply_to
        .clone()
        .unwrap_or_else(|| RESULT_QUEUE_NAME.to_string());
    let envelope = ResultEnvelope::from_result(&result);
    let payload = match serde_json::to_value(&envelope) {
        Ok(payload) => payload,
        Err(encode_error) => {
            error!(error = %encode_error, "failed to encode result envelope");
            return;
        }
    };

    let mut metadata = std::collections::HashMap::new();
    if let Some(original_message_id) = original.payload.get("message_id") {
        metadata.insert("original_message_id".to_string(), original_message_id.clone());
    }
    metadata.insert(
        "completed_at".to_string(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );
    let options = SendOptions {
        correlation_id: original.correlation_id.clone(),
        metadata: Some(metadata),
        ..SendOptions::default()
    };
    if let Err(send_error) = ctx.queue.send_message(&reply_to, payload, options).await {
        error!(error = %send_error, queue = %reply_to, "failed to send execution result");
    }
}

/// Request overrides win over agent defaults.
fn resolve_parameters(
    instance: &AgentInstance,
    request: &ExecutionRequest,
) -> (Option<f64>, Option<u32>) {
    let temperature = request
        .temperature
        .or_else(|| instance.agent.configuration.temperature());
    let max_tokens = request
        .max_tokens
        .or_else(|| instance.agent.configuration.max_tokens());
    (temperature, max_tokens)
}

/// Metadata handed to the executor: the agent's static context plus the
/// request's dynamic context, with the request's own metadata layered on
/// top.
fn execution_metadata(instance: &AgentInstance, request: &ExecutionRequest) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(
        "agent_id".to_string(),
        Value::String(request.agent_id.to_string()),
    );
    metadata.insert(
        "agent_name".to_string(),
        Value::String(instance.agent.name.clone()),
    );
    metadata.insert(
        "template_id".to_string(),
        Value::String(instance.agent.template_id.clone()),
    );
    metadata.insert(
        "template_version".to_string(),
        Value::String(instance.agent.template_version_or_default().to_string()),
    );
    if let Some(task_id) = &request.task_id {
        metadata.insert("task_id".to_string(), Value::String(task_id.clone()));
    }
    metadata.insert(
        "message_id".to_string(),
        Value::String(request.message_id.clone()),
    );
    if let Some(context_id) = &request.context_id {
        metadata.insert("context_id".to_string(), Value::String(context_id.clone()));
    }
    if let Some(user_id) = &request.user_id {
        metadata.insert("user_id".to_string(), Value::String(user_id.clone()));
    }
    for (key, value) in &request.metadata {
        metadata.insert(key.clone(), value.clone());
    }
    metadata
}

/// Copy the request identifiers onto an outgoing result.
fn stamp_identifiers(result: &mut ExecutionResult, request: &ExecutionRequest) {
    result.message_id = Some(request.message_id.clone());
    result.task_id = request.task_id.clone();
    result.agent_id = Some(request.agent_id.to_string());
    result.context_id = request.context_id.clone();
}

/// Execution bookkeeping recorded on the outgoing result.
fn annotate_result(result: &mut ExecutionResult, instance: &AgentInstance, request: &ExecutionRequest) {
    result.metadata.insert(
        "instance_key".to_string(),
        Value::String(instance.instance_key()),
    );
    let kind = match request.message_type {
        MessageKind::Execute => "execute",
        MessageKind::StreamExecute => "stream_execute",
        MessageKind::Unknown => "unknown",
    };
    result
        .metadata
        .insert("message_type".to_string(), Value::String(kind.to_string()));
    if let Some(user_id) = &request.user_id {
        result
            .metadata
            .insert("user_id".to_string(), Value::String(user_id.clone()));
    }
}
