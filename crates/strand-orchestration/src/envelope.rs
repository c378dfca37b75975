//! Reply and stream queue payload envelopes.
//!
//! Results and chunks cross queues in these wire shapes. Field names and
//! the epoch-seconds `timestamp` are normative; external consumers parse
//! these payloads directly off the reply and stream queues.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use strand_executor::{ExecutionResult, FinishReason, StreamingChunk};
use strand_types::Metadata;

/// Metadata key marking the terminal message of a stream queue.
pub const STREAM_END_KEY: &str = "stream_end";
/// Metadata key carrying the chunk count on the end marker.
pub const TOTAL_CHUNKS_KEY: &str = "total_chunks";
/// Metadata key carrying the failure description on an error marker.
pub const ERROR_KEY: &str = "error";

fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

//─────────────────────────────
//  Result envelope
//─────────────────────────────

/// Execution result as it travels on a reply queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// Message the result answers.
    pub message_id: String,
    /// Task the message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Agent that processed the message.
    pub agent_id: String,
    /// Broader grouping context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// Whether execution succeeded.
    pub success: bool,
    /// Final reply content; empty on failure.
    #[serde(default)]
    pub content: String,
    /// Error description, when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock processing time.
    #[serde(default)]
    pub processing_time_ms: u64,
    /// Tokens consumed by the prompt.
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens produced in the completion.
    #[serde(default)]
    pub completion_tokens: u32,
    /// Result metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Epoch seconds when the envelope was built.
    pub timestamp: f64,
}

impl ResultEnvelope {
    /// Wrap an execution result for the wire.
    pub fn from_result(result: &ExecutionResult) -> Self {
        Self {
            message_id: result.message_id.clone().unwrap_or_default(),
            task_id: result.task_id.clone(),
            agent_id: result.agent_id.clone().unwrap_or_default(),
            context_id: result.context_id.clone(),
            success: result.success,
            content: result.message.clone().unwrap_or_default(),
            error: result.error.clone(),
            processing_time_ms: result.processing_time_ms,
            prompt_tokens: result.prompt_tokens,
            completion_tokens: result.completion_tokens,
            metadata: result.metadata.clone(),
            timestamp: epoch_seconds(),
        }
    }

    /// Unwrap the envelope back into a domain result.
    pub fn into_result(self) -> ExecutionResult {
        let mut result = if self.success {
            ExecutionResult::success(self.content)
        } else {
            ExecutionResult::failure(self.error.unwrap_or_else(|| "execution failed".to_string()))
        };
        result.message_id = Some(self.message_id);
        result.task_id = self.task_id;
        result.agent_id = (!self.agent_id.is_empty()).then_some(self.agent_id);
        result.context_id = self.context_id;
        result.processing_time_ms = self.processing_time_ms;
        result.prompt_tokens = self.prompt_tokens;
        result.completion_tokens = self.completion_tokens;
        result.metadata = self.metadata;
        result
    }
}

//─────────────────────────────
//  Chunk envelope
//─────────────────────────────

/// Streaming chunk as it travels on a per-message stream queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkEnvelope {
    /// Message the chunk belongs to.
    pub message_id: String,
    /// Task the message belongs to; empty when the request carried none.
    #[serde(default)]
    pub task_id: String,
    /// Agent that produced the chunk.
    pub agent_id: String,
    /// Broader grouping context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// Chunk text; empty on markers.
    #[serde(default)]
    pub content: String,
    /// Zero-based position within the stream.
    #[serde(default)]
    pub chunk_index: u32,
    /// Set on terminal chunks only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Chunk metadata; carries the `stream_end` flag on markers.
    #[serde(default)]
    pub metadata: Metadata,
    /// Epoch seconds when the envelope was built.
    pub timestamp: f64,
}

impl ChunkEnvelope {
    /// Wrap an executor chunk, stamping the request identifiers.
    pub fn from_chunk(
        chunk: &StreamingChunk,
        message_id: &str,
        task_id: Option<&str>,
        agent_id: &str,
        context_id: Option<&str>,
    ) -> Self {
        Self {
            message_id: message_id.to_string(),
            task_id: task_id.unwrap_or_default().to_string(),
            agent_id: agent_id.to_string(),
            context_id: context_id.map(str::to_string),
            content: chunk.content.clone(),
            chunk_index: chunk.chunk_index,
            finish_reason: chunk.finish_reason,
            metadata: chunk.metadata.clone(),
            timestamp: epoch_seconds(),
        }
    }

    /// Build the terminal end-of-stream marker.
    pub fn end_marker(
        message_id: &str,
        task_id: Option<&str>,
        agent_id: &str,
        context_id: Option<&str>,
        total_chunks: u32,
    ) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(STREAM_END_KEY.to_string(), Value::Bool(true));
        metadata.insert(TOTAL_CHUNKS_KEY.to_string(), Value::from(total_chunks));
        Self {
            message_id: message_id.to_string(),
            task_id: task_id.unwrap_or_default().to_string(),
            agent_id: agent_id.to_string(),
            context_id: context_id.map(str::to_string),
            content: String::new(),
            chunk_index: total_chunks,
            finish_reason: Some(FinishReason::Stop),
            metadata,
            timestamp: epoch_seconds(),
        }
    }

    /// Build the terminal marker of a failed stream.
    pub fn error_marker(
        message_id: &str,
        task_id: Option<&str>,
        agent_id: &str,
        context_id: Option<&str>,
        chunk_index: u32,
        error: &str,
    ) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(STREAM_END_KEY.to_string(), Value::Bool(true));
        metadata.insert(ERROR_KEY.to_string(), Value::String(error.to_string()));
        Self {
            message_id: message_id.to_string(),
            task_id: task_id.unwrap_or_default().to_string(),
            agent_id: agent_id.to_string(),
            context_id: context_id.map(str::to_string),
            content: String::new(),
            chunk_index,
            finish_reason: Some(FinishReason::Error),
            metadata,
            timestamp: epoch_seconds(),
        }
    }

    /// Whether this envelope terminates its stream.
    pub fn is_stream_end(&self) -> bool {
        self.metadata
            .get(STREAM_END_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Unwrap the envelope back into a domain chunk.
    pub fn into_chunk(self) -> StreamingChunk {
        let mut chunk = StreamingChunk::new(self.content, self.chunk_index);
        chunk.finish_reason = self.finish_reason;
        chunk.message_id = Some(self.message_id);
        chunk.task_id = (!self.task_id.is_empty()).then_some(self.task_id);
        chunk.agent_id = Some(self.agent_id);
        chunk.context_id = self.context_id;
        chunk.metadata = self.metadata;
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_envelope_round_trips() {
        let mut result = ExecutionResult::success("done").with_tokens(5, 9);
        result.message_id = Some("m1".to_string());
        result.task_id = Some("t1".to_string());
        result.agent_id = Some("a1".to_string());

        let envelope = ResultEnvelope::from_result(&result);
        let json = serde_json::to_string(&envelope).unwrap();
        let back: ResultEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);

        let restored = back.into_result();
        assert!(restored.success);
        assert_eq!(restored.message.as_deref(), Some("done"));
        assert_eq!(restored.message_id.as_deref(), Some("m1"));
        assert_eq!(restored.total_tokens(), 14);
    }

    #[test]
    fn failure_envelope_restores_error() {
        let mut result = ExecutionResult::failure("agent nope not found");
        result.message_id = Some("m2".to_string());
        result.agent_id = Some("nope".to_string());

        let restored = ResultEnvelope::from_result(&result).into_result();
        assert!(!restored.success);
        assert_eq!(restored.error.as_deref(), Some("agent nope not found"));
        assert_eq!(restored.finish_reason, FinishReason::Error);
    }

    #[test]
    fn end_marker_is_recognized() {
        let marker = ChunkEnvelope::end_marker("m1", Some("t1"), "a1", None, 4);
        assert!(marker.is_stream_end());
        assert_eq!(marker.finish_reason, Some(FinishReason::Stop));
        assert_eq!(marker.metadata[TOTAL_CHUNKS_KEY], serde_json::json!(4));

        let regular = ChunkEnvelope::from_chunk(
            &StreamingChunk::new("text", 0),
            "m1",
            Some("t1"),
            "a1",
            None,
        );
        assert!(!regular.is_stream_end());
    }

    #[test]
    fn error_marker_carries_description() {
        let marker = ChunkEnvelope::error_marker("m1", None, "a1", None, 2, "boom");
        assert!(marker.is_stream_end());
        assert_eq!(marker.finish_reason, Some(FinishReason::Error));
        let chunk = marker.into_chunk();
        assert_eq!(chunk.metadata[ERROR_KEY], serde_json::json!("boom"));
        assert!(chunk.task_id.is_none());
    }

    #[test]
    fn chunk_envelope_round_trips() {
        let chunk = StreamingChunk::new("hello ", 0);
        let envelope = ChunkEnvelope::from_chunk(&chunk, "m1", Some("t1"), "a1", Some("c1"));
        let json = serde_json::to_string(&envelope).unwrap();
        let back: ChunkEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);

        let restored = back.into_chunk();
        assert_eq!(restored.content, "hello ");
        assert_eq!(restored.task_id.as_deref(), Some("t1"));
        assert_eq!(restored.context_id.as_deref(), Some("c1"));
    }
}
