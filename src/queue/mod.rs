use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;

pub mod memory;
pub mod sqs;

// --------------------------------------------------------------------------------------------------------------

/// One message as handed out by a receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub body:           String,
    /// Opaque token needed to delete this particular delivery.
    pub receipt_handle: String,
}

/// Minimal queue surface used by the dispatcher and the telemetry emitter.
/// Implementations are shared between the consumer loop and background sessions.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Long-poll for up to `max_messages`, waiting at most `wait` when the queue is empty.
    async fn receive(&self, queue_id: &str, max_messages: u32, wait: Duration) -> Result<Vec<RawMessage>, QueueError>;

    async fn send(&self, queue_id: &str, body: String) -> Result<(), QueueError>;

    async fn delete(&self, queue_id: &str, receipt_handle: &str) -> Result<(), QueueError>;
}
