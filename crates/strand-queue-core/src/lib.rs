#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strand-queue-core** – Message queue abstraction for the Strand runtime.
//!
//! This crate defines the named, priority-ordered queue contract the
//! orchestrator schedules over: at-least-once delivery to competing
//! consumers, acknowledge / reject-with-requeue semantics, and
//! dead-lettering once a message exhausts its retry budget. Backends live
//! in sibling crates; the in-process reference implementation is
//! `strand-queue-memory`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

//─────────────────────────────
//  Priority and status
//─────────────────────────────

/// Delivery priority of a queued message.
///
/// Serialized as the integers `1..=4` on the wire. Higher priorities are
/// always delivered before lower ones; within a priority class delivery is
/// FIFO by enqueue time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessagePriority {
    /// Background work.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Delivered ahead of normal traffic; used for stream chunks.
    High,
    /// Jumps everything else.
    Urgent,
}

impl From<MessagePriority> for u8 {
    fn from(priority: MessagePriority) -> u8 {
        match priority {
            MessagePriority::Low => 1,
            MessagePriority::Normal => 2,
            MessagePriority::High => 3,
            MessagePriority::Urgent => 4,
        }
    }
}

impl TryFrom<u8> for MessagePriority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessagePriority::Low),
            2 => Ok(MessagePriority::Normal),
            3 => Ok(MessagePriority::High),
            4 => Ok(MessagePriority::Urgent),
            other => Err(format!("invalid message priority: {other}")),
        }
    }
}

/// Processing status of a queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Waiting in a queue's pending list.
    Pending,
    /// Delivered to a consumer and awaiting acknowledgment.
    Processing,
    /// Acknowledged; removed from the queue.
    Completed,
    /// Dead-lettered: rejected without requeue or retries exhausted.
    Failed,
    /// Rejected with requeue; back in the pending list.
    Retry,
}

//─────────────────────────────
//  Message envelope
//─────────────────────────────

/// Envelope around an opaque payload while it moves through a queue.
///
/// At any moment a message is in exactly one of: a queue's pending list,
/// its in-flight list, or removed (acknowledged or dead-lettered).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Unique envelope id, distinct from any id inside the payload.
    pub id: String,
    /// Queue this message belongs to.
    pub queue_name: String,
    /// Opaque payload; the queue never inspects it.
    pub payload: Value,
    /// Delivery priority.
    #[serde(default)]
    pub priority: MessagePriority,
    /// Current processing status.
    pub status: MessageStatus,
    /// Number of delivery attempts that ended in reject-with-requeue.
    #[serde(default)]
    pub retry_count: u32,
    /// Retry budget before dead-lettering.
    #[serde(default = "QueueMessage::default_max_retries")]
    pub max_retries: u32,
    /// Requested delivery delay. Stored on the envelope for every backend;
    /// the in-memory backend does not honor it.
    #[serde(default)]
    pub delay_seconds: u32,
    /// Opaque correlation id propagated for tracing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Queue the consumer should send its reply to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Envelope metadata (delivery bookkeeping, reject reasons).
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Enqueue timestamp.
    pub created_at: DateTime<Utc>,
    /// Last status-change timestamp.
    pub updated_at: DateTime<Utc>,
}

impl QueueMessage {
    fn default_max_retries() -> u32 {
        3
    }

    /// Create a fresh pending message for the given queue.
    pub fn create(queue_name: impl Into<String>, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            queue_name: queue_name.into(),
            payload,
            priority: MessagePriority::Normal,
            status: MessageStatus::Pending,
            retry_count: 0,
            max_retries: Self::default_max_retries(),
            delay_seconds: 0,
            correlation_id: None,
            reply_to: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the delivery priority.
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach a correlation id.
    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Attach a reply queue name.
    pub fn with_reply_to(mut self, reply_to: Option<String>) -> Self {
        self.reply_to = reply_to;
        self
    }

    /// Attach envelope metadata.
    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the requested delivery delay.
    pub fn with_delay_seconds(mut self, delay_seconds: u32) -> Self {
        self.delay_seconds = delay_seconds;
        self
    }

    /// Whether the retry budget allows another requeue.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

//─────────────────────────────
//  Send parameters and stats
//─────────────────────────────

/// Optional parameters of [`MessageQueue::send_message`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Delivery priority; defaults to [`MessagePriority::Normal`].
    pub priority: MessagePriority,
    /// Requested delivery delay in seconds.
    pub delay_seconds: u32,
    /// Opaque correlation id.
    pub correlation_id: Option<String>,
    /// Reply queue name handed to the consumer.
    pub reply_to: Option<String>,
    /// Envelope metadata.
    pub metadata: Option<HashMap<String, Value>>,
}

impl SendOptions {
    /// Options with only a non-default priority set.
    pub fn with_priority(priority: MessagePriority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }
}

/// Point-in-time statistics of a single queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Queue the stats describe.
    pub queue_name: String,
    /// Pending plus in-flight messages.
    pub total_messages: usize,
    /// Messages waiting for delivery.
    pub pending_messages: usize,
    /// Messages delivered but not yet acknowledged.
    pub processing_messages: usize,
    /// Messages acknowledged since queue creation.
    pub completed_messages: usize,
    /// Messages dead-lettered since queue creation.
    pub failed_messages: usize,
    /// When the stats were computed.
    pub last_updated: DateTime<Utc>,
}

impl QueueStats {
    /// Empty stats for a queue that holds no messages.
    pub fn empty(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            total_messages: 0,
            pending_messages: 0,
            processing_messages: 0,
            completed_messages: 0,
            failed_messages: 0,
            last_updated: Utc::now(),
        }
    }
}

//─────────────────────────────
//  Errors
//─────────────────────────────

/// Errors surfaced by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A bounded queue refused a send because it is at capacity.
    #[error("queue {queue} is full (max size {max_size})")]
    QueueFull {
        /// Queue that refused the send.
        queue: String,
        /// Configured capacity.
        max_size: usize,
    },
    /// The selected backend kind is recognized but not available in-process.
    #[error("queue backend '{0}' is not available in this build")]
    BackendUnavailable(String),
    /// The backend failed in a backend-specific way.
    #[error("queue backend failure: {0}")]
    Backend(String),
}

/// Backend selector parsed from `MESSAGE_QUEUE_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackendKind {
    /// In-process reference backend.
    Memory,
    /// Redis-backed queue; recognized but not provided by the core.
    Redis,
    /// RabbitMQ-backed queue; recognized but not provided by the core.
    RabbitMq,
}

impl std::str::FromStr for QueueBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            "rabbitmq" => Ok(Self::RabbitMq),
            other => Err(format!("unknown message queue type: {other}")),
        }
    }
}

impl std::fmt::Display for QueueBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::RabbitMq => "rabbitmq",
        };
        f.write_str(name)
    }
}

//─────────────────────────────
//  Queue trait
//─────────────────────────────

/// Named, priority-ordered message queue with at-least-once delivery.
///
/// Multiple consumers may compete on one queue; a message delivered by
/// [`receive_message`](Self::receive_message) is invisible to other
/// consumers until it is acknowledged or rejected with requeue.
/// Implementations must keep stats consistent after every operation.
#[async_trait]
pub trait MessageQueue: Send + Sync + std::fmt::Debug {
    /// Prepare the backend for use. Idempotent.
    async fn initialize(&self) -> Result<(), QueueError>;

    /// Tear the backend down, dropping all in-memory state. Idempotent.
    async fn shutdown(&self) -> Result<(), QueueError>;

    /// Create a queue. Returns `true` if newly created, `false` if it
    /// already existed. Queues are also auto-created on first send.
    async fn create_queue(
        &self,
        queue_name: &str,
        max_size: Option<usize>,
        ttl_seconds: Option<u64>,
    ) -> Result<bool, QueueError>;

    /// Delete a queue and everything in it. Returns `false` for unknown
    /// queues.
    async fn delete_queue(&self, queue_name: &str) -> Result<bool, QueueError>;

    /// Drop all pending and in-flight messages; returns how many were
    /// removed. Returns `0` for unknown queues.
    async fn purge_queue(&self, queue_name: &str) -> Result<usize, QueueError>;

    /// Names of all known queues.
    async fn list_queues(&self) -> Result<Vec<String>, QueueError>;

    /// Enqueue a payload; returns the envelope id.
    async fn send_message(
        &self,
        queue_name: &str,
        payload: Value,
        options: SendOptions,
    ) -> Result<String, QueueError>;

    /// Receive the highest-priority pending message, moving it in-flight.
    ///
    /// With `timeout_seconds = None` this returns immediately (with `None`
    /// when the queue is empty); with a positive timeout it blocks
    /// cooperatively until a message arrives or the timeout elapses.
    async fn receive_message(
        &self,
        queue_name: &str,
        timeout_seconds: Option<u64>,
    ) -> Result<Option<QueueMessage>, QueueError>;

    /// Receive up to `max_messages` as a contiguous prefix of the priority
    /// order. Same blocking behavior as
    /// [`receive_message`](Self::receive_message).
    async fn receive_messages(
        &self,
        queue_name: &str,
        max_messages: usize,
        timeout_seconds: Option<u64>,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledge an in-flight message, removing it. Returns `false` if
    /// the message is not in-flight (idempotent no-op).
    async fn acknowledge_message(&self, message: &QueueMessage) -> Result<bool, QueueError>;

    /// Reject an in-flight message. With `requeue` and remaining retry
    /// budget the message goes back to the tail of its priority class;
    /// otherwise it is dead-lettered. Returns `false` if the message is
    /// not in-flight.
    async fn reject_message(
        &self,
        message: &QueueMessage,
        requeue: bool,
        reason: Option<String>,
    ) -> Result<bool, QueueError>;

    /// Point-in-time stats of a queue. Unknown queues report empty stats.
    async fn get_queue_stats(&self, queue_name: &str) -> Result<QueueStats, QueueError>;
}
