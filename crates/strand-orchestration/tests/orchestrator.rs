//! End-to-end orchestrator scenarios over the in-memory queue, repository,
//! and the reference scripted executor.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use strand_agents::{AgentRepository, InMemoryAgentRepository};
use strand_executor::{FinishReason, ScriptedExecutor, ScriptedStep, TemplateRegistry};
use strand_orchestration::{
    ExecutionRequest, Orchestrator, OrchestratorConfig, ResultEnvelope, MESSAGE_QUEUE_NAME,
    RESULT_QUEUE_NAME, STREAM_QUEUE_PREFIX,
};
use strand_queue_core::{MessagePriority, MessageQueue};
use strand_queue_memory::InMemoryQueue;
use strand_types::{Agent, AgentConfiguration, AgentId, ChatMessage, TemplateInfo};

struct Fixture {
    orchestrator: Arc<Orchestrator>,
    queue: Arc<InMemoryQueue>,
    agent_id: AgentId,
}

fn conversation_registry() -> TemplateRegistry {
    TemplateRegistry::from_templates([TemplateInfo::new(
        "conversation",
        "strand",
        "Conversation",
        "Plain chat template",
        "1.0.0",
    )
    .unwrap()])
}

async fn fixture(executor: ScriptedExecutor, max_workers: usize, initialize: bool) -> Fixture {
    let queue = Arc::new(InMemoryQueue::new());
    let repository = Arc::new(InMemoryAgentRepository::new());

    let mut agent = Agent::new("greeter", "conversation", AgentConfiguration::default()).unwrap();
    agent.activate();
    let agent_id = agent.id.clone();
    repository.save(agent).await.unwrap();

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&queue) as Arc<dyn MessageQueue>,
        repository,
        Arc::new(executor),
        OrchestratorConfig::default()
            .with_max_workers(max_workers)
            .with_cleanup_interval(Duration::from_secs(60)),
    ));
    if initialize {
        orchestrator.initialize().await.unwrap();
    }
    Fixture {
        orchestrator,
        queue,
        agent_id,
    }
}

fn user_request(agent_id: &AgentId, content: &str) -> ExecutionRequest {
    ExecutionRequest::execute(
        agent_id.clone(),
        vec![ChatMessage::user(content).unwrap()],
    )
}

#[tokio::test]
async fn happy_non_stream_round_trip() {
    let fixture = fixture(ScriptedExecutor::new(conversation_registry()), 2, true).await;
    let request = user_request(&fixture.agent_id, "hi").with_task_id("task-1");

    let message_id = fixture.orchestrator.submit(&request).await.unwrap();
    assert_eq!(message_id, request.message_id);

    let result = fixture
        .orchestrator
        .await_result(&message_id, Some(10))
        .await
        .unwrap()
        .expect("result within timeout");

    assert!(result.success);
    assert_eq!(result.message.as_deref(), Some("You said: hi"));
    assert_eq!(result.message_id.as_deref(), Some(message_id.as_str()));
    assert_eq!(result.task_id.as_deref(), Some("task-1"));
    assert_eq!(result.agent_id.as_deref(), Some(fixture.agent_id.as_str()));

    fixture.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn happy_stream_of_four_chunks() {
    let executor = ScriptedExecutor::new(conversation_registry()).with_script(
        "conversation",
        ScriptedStep::chunks(["Hello ", "there! ", "This is a ", "streaming response."]),
    );
    let fixture = fixture(executor, 2, true).await;
    let request = ExecutionRequest::stream(
        fixture.agent_id.clone(),
        vec![ChatMessage::user("go").unwrap()],
    )
    .with_task_id("task-s");

    let message_id = fixture.orchestrator.submit(&request).await.unwrap();
    let chunks: Vec<_> = fixture.orchestrator.stream_results(&message_id).collect().await;

    assert_eq!(chunks.len(), 4);
    let contents: Vec<&str> = chunks.iter().map(|chunk| chunk.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["Hello ", "there! ", "This is a ", "streaming response."]
    );
    for (expected_index, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index as usize, expected_index);
    }
    // Exactly the final chunk carries a finish reason.
    assert!(chunks[..3].iter().all(|chunk| chunk.finish_reason.is_none()));
    assert_eq!(chunks[3].finish_reason, Some(FinishReason::Stop));

    // The reply queue carries the stream summary.
    let summary = fixture
        .orchestrator
        .await_result(&message_id, Some(10))
        .await
        .unwrap()
        .expect("summary result");
    assert!(summary.success);
    assert_eq!(
        summary.message.as_deref(),
        Some("Streaming completed with 4 chunks")
    );
    assert_eq!(summary.metadata["chunk_count"], serde_json::json!(4));

    // The ephemeral stream queue was deleted by the consumer.
    let queues = fixture.queue.list_queues().await.unwrap();
    assert!(!queues
        .iter()
        .any(|name| name.starts_with(STREAM_QUEUE_PREFIX)));

    fixture.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_agent_fails_cleanly() {
    let fixture = fixture(ScriptedExecutor::new(conversation_registry()), 2, true).await;
    let request = user_request(&AgentId::from("nope"), "hello?");

    let message_id = fixture.orchestrator.submit(&request).await.unwrap();
    let result = fixture
        .orchestrator
        .await_result(&message_id, Some(10))
        .await
        .unwrap()
        .expect("failure result");

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap_or_default().contains("not found"));
    assert!(fixture.orchestrator.list_instances().await.is_empty());

    // The primary queue drains cleanly: nothing pending, nothing in
    // flight once the worker finishes acknowledging.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stats = fixture
            .queue
            .get_queue_stats(MESSAGE_QUEUE_NAME)
            .await
            .unwrap();
        if stats.pending_messages == 0 && stats.processing_messages == 0 {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "primary queue never drained: {stats:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fixture.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn executor_failure_mid_stream() {
    let executor = ScriptedExecutor::new(conversation_registry()).with_script(
        "conversation",
        vec![
            ScriptedStep::Chunk("partial ".to_string()),
            ScriptedStep::Fail("backend exploded".to_string()),
        ],
    );
    let fixture = fixture(executor, 2, true).await;
    let request = ExecutionRequest::stream(
        fixture.agent_id.clone(),
        vec![ChatMessage::user("go").unwrap()],
    );

    let message_id = fixture.orchestrator.submit(&request).await.unwrap();
    let chunks: Vec<_> = fixture.orchestrator.stream_results(&message_id).collect().await;

    // The delivered chunk, then one terminal error chunk.
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content, "partial ");
    assert_eq!(chunks[1].finish_reason, Some(FinishReason::Error));
    assert!(chunks[1].metadata["error"]
        .as_str()
        .unwrap()
        .contains("backend exploded"));

    // The reply queue carries a failure result.
    let result = fixture
        .orchestrator
        .await_result(&message_id, Some(10))
        .await
        .unwrap()
        .expect("failure result");
    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("backend exploded"));

    // The stream queue is gone.
    let queues = fixture.queue.list_queues().await.unwrap();
    assert!(!queues
        .iter()
        .any(|name| name.starts_with(STREAM_QUEUE_PREFIX)));

    fixture.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn priority_ordering_with_single_worker() {
    // Submit before any worker runs, then start exactly one worker and
    // watch the completion order on the reply queue.
    let fixture = fixture(ScriptedExecutor::new(conversation_registry()), 1, false).await;

    for (content, priority) in [
        ("normal", MessagePriority::Normal),
        ("high", MessagePriority::High),
        ("low", MessagePriority::Low),
        ("urgent", MessagePriority::Urgent),
    ] {
        let request = user_request(&fixture.agent_id, content).with_priority(priority);
        fixture.orchestrator.submit(&request).await.unwrap();
    }

    fixture.orchestrator.initialize().await.unwrap();

    let mut completed = Vec::new();
    for _ in 0..4 {
        let message = fixture
            .queue
            .receive_message(RESULT_QUEUE_NAME, Some(10))
            .await
            .unwrap()
            .expect("result within timeout");
        let envelope: ResultEnvelope = serde_json::from_value(message.payload.clone()).unwrap();
        fixture.queue.acknowledge_message(&message).await.unwrap();
        completed.push(envelope.content);
    }
    assert_eq!(
        completed,
        vec![
            "You said: urgent",
            "You said: high",
            "You said: normal",
            "You said: low"
        ]
    );

    fixture.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn instance_reuse_across_sequential_requests() {
    let fixture = fixture(ScriptedExecutor::new(conversation_registry()), 2, true).await;

    for content in ["first", "second"] {
        let request = user_request(&fixture.agent_id, content).with_task_id("same-task");
        let message_id = fixture.orchestrator.submit(&request).await.unwrap();
        let result = fixture
            .orchestrator
            .await_result(&message_id, Some(10))
            .await
            .unwrap()
            .expect("result within timeout");
        assert!(result.success);
    }

    let instances = fixture.orchestrator.list_instances().await;
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].message_count, 2);
    assert_eq!(
        instances[0].instance_key,
        format!("{}#same-task", fixture.agent_id)
    );

    fixture.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn transient_failures_exhaust_the_retry_budget() {
    let executor = ScriptedExecutor::new(conversation_registry()).with_script(
        "conversation",
        vec![ScriptedStep::TransientFail("upstream 503".to_string())],
    );
    let fixture = fixture(executor, 1, true).await;
    let request = user_request(&fixture.agent_id, "flaky");

    let message_id = fixture.orchestrator.submit(&request).await.unwrap();
    let result = fixture
        .orchestrator
        .await_result(&message_id, Some(10))
        .await
        .unwrap()
        .expect("failure result");
    assert!(!result.success);

    // The message is requeued until its retry budget runs out, then
    // dead-lettered; the queue must drain completely.
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let stats = fixture
            .queue
            .get_queue_stats(MESSAGE_QUEUE_NAME)
            .await
            .unwrap();
        if stats.total_messages == 0 && stats.failed_messages == 1 {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "message never dead-lettered: {stats:?}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fixture.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn await_result_caches_results_for_other_waiters() {
    let fixture = fixture(ScriptedExecutor::new(conversation_registry()), 2, true).await;

    let first = user_request(&fixture.agent_id, "one");
    let second = user_request(&fixture.agent_id, "two");
    let first_id = fixture.orchestrator.submit(&first).await.unwrap();
    let second_id = fixture.orchestrator.submit(&second).await.unwrap();

    // Waiting on the second drains the first result into the cache.
    let second_result = fixture
        .orchestrator
        .await_result(&second_id, Some(10))
        .await
        .unwrap()
        .expect("second result");
    assert_eq!(second_result.message.as_deref(), Some("You said: two"));

    let first_result = fixture
        .orchestrator
        .await_result(&first_id, Some(10))
        .await
        .unwrap()
        .expect("first result from cache");
    assert_eq!(first_result.message.as_deref(), Some("You said: one"));

    fixture.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_destroys_instances_and_stops_cleanly() {
    let fixture = fixture(ScriptedExecutor::new(conversation_registry()), 2, true).await;

    let request = user_request(&fixture.agent_id, "hi").with_task_id("t");
    let message_id = fixture.orchestrator.submit(&request).await.unwrap();
    fixture
        .orchestrator
        .await_result(&message_id, Some(10))
        .await
        .unwrap()
        .expect("result before shutdown");
    assert_eq!(fixture.orchestrator.list_instances().await.len(), 1);

    fixture.orchestrator.shutdown().await.unwrap();
    assert!(!fixture.orchestrator.is_running());
    assert!(fixture.orchestrator.list_instances().await.is_empty());
    // The queue backend dropped its state with the orchestrator.
    assert!(fixture.queue.list_queues().await.unwrap().is_empty());

    // Shutdown after shutdown is a no-op.
    fixture.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn custom_reply_queue_is_honored() {
    let fixture = fixture(ScriptedExecutor::new(conversation_registry()), 2, true).await;
    let request = user_request(&fixture.agent_id, "routed").with_reply_to("caller.replies");

    fixture.orchestrator.submit(&request).await.unwrap();

    let message = fixture
        .queue
        .receive_message("caller.replies", Some(10))
        .await
        .unwrap()
        .expect("reply on caller-owned queue");
    let envelope: ResultEnvelope = serde_json::from_value(message.payload.clone()).unwrap();
    fixture.queue.acknowledge_message(&message).await.unwrap();
    assert_eq!(envelope.content, "You said: routed");

    fixture.orchestrator.shutdown().await.unwrap();
}
