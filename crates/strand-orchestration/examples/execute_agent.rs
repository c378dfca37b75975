//! Agent Execution Example
//!
//! This example wires the orchestrator up with the in-memory queue, an
//! in-memory agent repository, and the reference scripted executor, then
//! runs one aggregate execution and one streaming execution against the
//! same conversation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use tracing::info;

use strand_agents::{AgentRepository, InMemoryAgentRepository};
use strand_executor::{ScriptedExecutor, TemplateRegistry};
use strand_orchestration::{ExecutionRequest, Orchestrator, OrchestratorConfig};
use strand_queue_memory::InMemoryQueue;
use strand_types::{Agent, AgentConfiguration, ChatMessage, ConfigField, TemplateInfo};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Starting agent execution example");

    // Register the conversation template the demo agent instantiates.
    let registry = TemplateRegistry::from_templates([TemplateInfo::new(
        "conversation",
        "strand",
        "Conversation",
        "Plain chat template",
        "1.0.0",
    )?
    .with_config_fields(vec![ConfigField::string("system_prompt")?.optional()])]);

    // Seed the repository with one active agent.
    let repository = Arc::new(InMemoryAgentRepository::new());
    let mut agent = Agent::new("greeter", "conversation", AgentConfiguration::default())?;
    agent.activate();
    let agent_id = agent.id.clone();
    repository.save(agent).await?;

    // Assemble and start the orchestrator.
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(InMemoryQueue::new()),
        repository,
        Arc::new(ScriptedExecutor::new(registry)),
        OrchestratorConfig::default()
            .with_max_workers(4)
            .with_cleanup_interval(Duration::from_secs(60)),
    ));
    orchestrator.initialize().await?;
    info!("Orchestrator initialized");

    // One aggregate execution.
    let request = ExecutionRequest::execute(
        agent_id.clone(),
        vec![ChatMessage::user("hello from the example")?],
    )
    .with_task_id("demo-task");
    let message_id = orchestrator.submit(&request).await?;
    let result = orchestrator
        .await_result(&message_id, Some(30))
        .await?
        .expect("result within timeout");
    info!(
        success = result.success,
        reply = result.message.as_deref().unwrap_or_default(),
        "aggregate execution finished"
    );

    // One streaming execution on the same task.
    let request = ExecutionRequest::stream(
        agent_id,
        vec![ChatMessage::user("stream this back to me")?],
    )
    .with_task_id("demo-task");
    let message_id = orchestrator.submit(&request).await?;
    let mut chunks = orchestrator.stream_results(&message_id);
    while let Some(chunk) = chunks.next().await {
        info!(
            index = chunk.chunk_index,
            content = %chunk.content,
            finish = ?chunk.finish_reason,
            "received chunk"
        );
    }

    for instance in orchestrator.list_instances().await {
        info!(
            key = %instance.instance_key,
            messages = instance.message_count,
            "live instance"
        );
    }

    orchestrator.shutdown().await?;
    info!("Orchestrator shut down");
    Ok(())
}
