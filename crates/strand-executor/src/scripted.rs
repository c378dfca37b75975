//! Reference executor.
//!
//! [`ScriptedExecutor`] is the registry-backed, stateless executor used by
//! tests and demos. Per template it either replays a configured script of
//! chunks (optionally ending in a failure) or synthesizes an echo reply from
//! the last user message. It honors the full executor contract: strict
//! chunk-index ordering, exactly one terminal chunk, a terminal chunk even
//! for empty streams, and `max_tokens` truncation reported as
//! [`FinishReason::Length`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use tracing::debug;

use strand_types::{ChatMessage, Metadata, TemplateInfo};

use crate::{
    AgentExecutor, ChunkStream, ExecutionResult, ExecutorError, FinishReason, StreamingChunk,
    TemplateRegistry,
};

/// One step of a scripted template response.
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    /// Yield a chunk of content.
    Chunk(String),
    /// Fail permanently with the given message.
    Fail(String),
    /// Fail with a retryable error.
    TransientFail(String),
}

impl ScriptedStep {
    /// Build chunk steps from string slices.
    pub fn chunks<'a>(contents: impl IntoIterator<Item = &'a str>) -> Vec<ScriptedStep> {
        contents
            .into_iter()
            .map(|content| ScriptedStep::Chunk(content.to_string()))
            .collect()
    }
}

/// Registry-backed reference executor.
///
/// Stateless: the registry and scripts are fixed at construction, so a
/// single instance can serve any number of concurrent executions.
#[derive(Debug, Clone)]
pub struct ScriptedExecutor {
    registry: Arc<TemplateRegistry>,
    scripts: HashMap<String, Vec<ScriptedStep>>,
}

impl ScriptedExecutor {
    /// Create an executor over the given registry with no scripts; every
    /// template falls back to the echo behavior.
    pub fn new(registry: TemplateRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            scripts: HashMap::new(),
        }
    }

    /// Attach a scripted response for one template.
    pub fn with_script(mut self, template_id: impl Into<String>, steps: Vec<ScriptedStep>) -> Self {
        self.scripts.insert(template_id.into(), steps);
        self
    }

    /// Resolve the steps for one execution: the template's script, or the
    /// echo reply split into word chunks.
    fn steps_for(&self, template_id: &str, messages: &[ChatMessage]) -> Vec<ScriptedStep> {
        if let Some(script) = self.scripts.get(template_id) {
            return script.clone();
        }
        let reply = echo_reply(messages);
        let words: Vec<&str> = reply.split_inclusive(' ').collect();
        words
            .into_iter()
            .map(|word| ScriptedStep::Chunk(word.to_string()))
            .collect()
    }
}

/// Synthesize the echo reply for a conversation.
fn echo_reply(messages: &[ChatMessage]) -> String {
    match messages.iter().rev().find(|message| message.is_user()) {
        Some(message) => format!("You said: {}", message.content),
        None => "Hello! How can I help?".to_string(),
    }
}

/// Whitespace-word count used for deterministic token accounting.
fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[async_trait]
impl AgentExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        template_id: &str,
        template_version: &str,
        _configuration: &Metadata,
        messages: &[ChatMessage],
        _temperature: Option<f64>,
        max_tokens: Option<u32>,
        metadata: Metadata,
    ) -> Result<ExecutionResult, ExecutorError> {
        if !self.registry.contains(template_id) {
            return Err(ExecutorError::TemplateNotFound(template_id.to_string()));
        }
        debug!(template_id, template_version, "executing scripted template");
        let started = Instant::now();

        let mut reply = String::new();
        for step in self.steps_for(template_id, messages) {
            match step {
                ScriptedStep::Chunk(content) => reply.push_str(&content),
                ScriptedStep::Fail(error) => return Err(ExecutorError::Internal(error)),
                ScriptedStep::TransientFail(error) => {
                    return Err(ExecutorError::Transient(error))
                }
            }
        }

        let prompt_tokens: u32 = messages
            .iter()
            .map(|message| word_count(&message.content))
            .sum();
        let mut completion_tokens = word_count(&reply);
        let mut finish_reason = FinishReason::Stop;
        if let Some(max_tokens) = max_tokens {
            if completion_tokens > max_tokens {
                reply = reply
                    .split_inclusive(' ')
                    .take(max_tokens as usize)
                    .collect::<String>()
                    .trim_end()
                    .to_string();
                completion_tokens = max_tokens;
                finish_reason = FinishReason::Length;
            }
        }

        let mut result = ExecutionResult::success(reply)
            .with_tokens(prompt_tokens, completion_tokens)
            .with_processing_time_ms(started.elapsed().as_millis() as u64)
            .with_metadata(metadata);
        result.finish_reason = finish_reason;
        Ok(result)
    }

    async fn stream_execute(
        &self,
        template_id: &str,
        template_version: &str,
        _configuration: &Metadata,
        messages: &[ChatMessage],
        _temperature: Option<f64>,
        _max_tokens: Option<u32>,
        _metadata: Metadata,
    ) -> ChunkStream {
        if !self.registry.contains(template_id) {
            let missing = ExecutorError::TemplateNotFound(template_id.to_string());
            return Box::pin(stream::iter(vec![Err(missing)]));
        }
        debug!(template_id, template_version, "streaming scripted template");

        let steps = self.steps_for(template_id, messages);
        let failing = steps
            .iter()
            .any(|step| !matches!(step, ScriptedStep::Chunk(_)));
        let chunk_total = steps
            .iter()
            .take_while(|step| matches!(step, ScriptedStep::Chunk(_)))
            .count();

        let mut items: Vec<Result<StreamingChunk, ExecutorError>> = Vec::new();
        let mut index = 0u32;
        for step in steps {
            match step {
                ScriptedStep::Chunk(content) => {
                    let mut chunk = StreamingChunk::new(content, index);
                    index += 1;
                    if !failing && index as usize == chunk_total {
                        chunk = chunk.with_finish_reason(FinishReason::Stop);
                    }
                    items.push(Ok(chunk));
                }
                ScriptedStep::Fail(error) => {
                    items.push(Err(ExecutorError::Internal(error)));
                    break;
                }
                ScriptedStep::TransientFail(error) => {
                    items.push(Err(ExecutorError::Transient(error)));
                    break;
                }
            }
        }
        if items.is_empty() {
            // An empty stream still carries a terminal marker.
            items.push(Ok(
                StreamingChunk::new("", 0).with_finish_reason(FinishReason::Stop)
            ));
        }
        Box::pin(stream::iter(items))
    }

    fn validate_configuration(
        &self,
        template_id: &str,
        _template_version: &str,
        configuration: &Metadata,
    ) -> Vec<String> {
        self.registry.validate(template_id, configuration)
    }

    fn supported_templates(&self) -> Vec<TemplateInfo> {
        self.registry.templates()
    }
}
