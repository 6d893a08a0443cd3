use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};

use crate::configuration::config::FailurePolicy;
use crate::error::{DispatchError, QueueError};
use crate::models::envelope::{decode, Envelope, RawPayload};
use crate::queue::QueueClient;

// --------------------------------------------------------------------------------------------------------------
// Message dispatch
//
//   received -> decoded -> typed -> handled -> deleted
//   received -> decode failed            -> deleted / retained (failure policy)
//   received -> handle failed            -> deleted / retained (failure policy)
//   received -> decoded -> no route      -> deleted
//
// Nothing escapes `dispatch`: every failure is logged and summarised in the outcome so the
// consumption loop keeps polling.
// --------------------------------------------------------------------------------------------------------------

/// A handler bound to one event type. It receives the decoded envelope and extracts the
/// payload type it expects.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope<RawPayload>) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Handled,
    UnknownType,
    DecodeFailed,
    HandleFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub status:  DispatchStatus,
    /// Event type, when the envelope could be decoded.
    pub event_type: Option<String>,
    /// Whether the source message was removed from its queue.
    pub deleted: bool,
}

pub struct MessageDispatcher {
    queue:          Arc<dyn QueueClient>,
    routes:         HashMap<String, Arc<dyn EventHandler>>,
    failure_policy: FailurePolicy,
}

impl MessageDispatcher {
    pub fn new(queue: Arc<dyn QueueClient>, failure_policy: FailurePolicy) -> Self {
        Self { queue, routes: HashMap::new(), failure_policy }
    }

    /// Bind `handler` to `event_type`, replacing any previous binding.
    pub fn register(&mut self, event_type: &str, handler: Arc<dyn EventHandler>) -> &mut Self {
        if self.routes.insert(event_type.to_string(), handler).is_some() {
            warn!("[Dispatch] Route for '{}' replaced", event_type);
        }
        self
    }

    pub fn routes(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Route one raw message and settle its fate on `queue_id`.
    pub async fn dispatch(&self, raw_body: &str, receipt_handle: &str, queue_id: &str) -> DispatchOutcome {
        debug!("[Dispatch] Raw message: {}", raw_body);

        let (status, event_type) = match decode(raw_body) {
            Ok(envelope) => {
                let event_type = envelope.event_type.clone();
                info!("[Dispatch] Message type: {} (id {})", event_type, envelope.id);

                let status = match self.route(envelope).await {
                    Ok(()) => DispatchStatus::Handled,
                    Err(DispatchError::UnknownType(t)) => {
                        warn!("[Dispatch] Unknown message type: {}", t);
                        DispatchStatus::UnknownType
                    }
                    Err(e) => {
                        error!("[Dispatch] Handling '{}' failed: {} | body: {}", event_type, e, raw_body);
                        DispatchStatus::HandleFailed
                    }
                };
                (status, Some(event_type))
            }
            Err(e) => {
                error!("[Dispatch] {} | body: {}", e, raw_body);
                (DispatchStatus::DecodeFailed, None)
            }
        };

        let should_delete = match status {
            DispatchStatus::Handled | DispatchStatus::UnknownType => true,
            DispatchStatus::DecodeFailed | DispatchStatus::HandleFailed => {
                self.failure_policy == FailurePolicy::Delete
            }
        };

        let deleted = if should_delete {
            self.delete(queue_id, receipt_handle).await
        } else {
            warn!("[Dispatch] Leaving failed message on the queue for another attempt");
            false
        };

        DispatchOutcome { status, event_type, deleted }
    }

    async fn route(&self, envelope: Envelope<RawPayload>) -> Result<(), DispatchError> {
        match self.routes.get(&envelope.event_type) {
            Some(handler) => handler.handle(envelope).await,
            None => Err(DispatchError::UnknownType(envelope.event_type)),
        }
    }

    /// Delete failures are logged and reported, never propagated.
    async fn delete(&self, queue_id: &str, receipt_handle: &str) -> bool {
        match self.queue.delete(queue_id, receipt_handle).await {
            Ok(()) => {
                info!("[Dispatch] Message deleted from the queue");
                true
            }
            Err(QueueError::InvalidReceipt(_)) => {
                error!("[Dispatch] Invalid receipt handle: {}", receipt_handle);
                false
            }
            Err(e) => {
                error!("[Dispatch] Error deleting message: {}", e);
                false
            }
        }
    }
}

// --------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::queue::memory::InMemoryQueue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const IN: &str = "commands-demo";

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle(&self, _envelope: Envelope<RawPayload>) -> Result<(), DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle(&self, envelope: Envelope<RawPayload>) -> Result<(), DispatchError> {
            let _: Envelope<u64> = envelope.into_typed()?;
            Err(DispatchError::Codec(CodecError::Decode(serde_json::from_str::<u8>("x").unwrap_err())))
        }
    }

    /// Fails the first attempt, succeeds afterwards.
    #[derive(Default)]
    struct FailsOnce {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for FailsOnce {
        async fn handle(&self, _envelope: Envelope<RawPayload>) -> Result<(), DispatchError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(DispatchError::Codec(CodecError::Decode(serde_json::from_str::<u8>("x").unwrap_err())));
            }
            Ok(())
        }
    }

    async fn receive_one(queue: &InMemoryQueue, body: &str) -> crate::queue::RawMessage {
        queue.push(IN, body);
        queue.receive(IN, 1, Duration::ZERO).await.expect("receive").remove(0)
    }

    #[tokio::test]
    async fn routes_by_type_and_deletes() {
        let queue = Arc::new(InMemoryQueue::new());
        let handler = Arc::new(Counting::default());
        let mut dispatcher = MessageDispatcher::new(queue.clone(), FailurePolicy::Delete);
        dispatcher.register("t.v1", handler.clone());

        let msg = receive_one(&queue, r#"{"type":"t.v1","id":"1","data":{}}"#).await;
        let outcome = dispatcher.dispatch(&msg.body, &msg.receipt_handle, IN).await;

        assert_eq!(outcome.status, DispatchStatus::Handled);
        assert_eq!(outcome.event_type.as_deref(), Some("t.v1"));
        assert!(outcome.deleted);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.in_flight_count(IN), 0);
    }

    #[tokio::test]
    async fn unknown_type_is_consumed() {
        let queue = Arc::new(InMemoryQueue::new());
        let dispatcher = MessageDispatcher::new(queue.clone(), FailurePolicy::Retain);

        let msg = receive_one(&queue, r#"{"type":"nobody.home","id":"1"}"#).await;
        let outcome = dispatcher.dispatch(&msg.body, &msg.receipt_handle, IN).await;

        assert_eq!(outcome.status, DispatchStatus::UnknownType);
        assert!(outcome.deleted);
    }

    #[tokio::test]
    async fn failure_policy_decides_fate_of_bad_messages() {
        for (policy, expect_deleted) in [(FailurePolicy::Delete, true), (FailurePolicy::Retain, false)] {
            let queue = Arc::new(InMemoryQueue::new());
            let mut dispatcher = MessageDispatcher::new(queue.clone(), policy);
            dispatcher.register("t.v1", Arc::new(Failing));

            let malformed = receive_one(&queue, "{ not json").await;
            let outcome = dispatcher.dispatch(&malformed.body, &malformed.receipt_handle, IN).await;
            assert_eq!(outcome.status, DispatchStatus::DecodeFailed);
            assert_eq!(outcome.deleted, expect_deleted);

            let bad_shape = receive_one(&queue, r#"{"type":"t.v1","id":"2","data":{"a":1}}"#).await;
            let outcome = dispatcher.dispatch(&bad_shape.body, &bad_shape.receipt_handle, IN).await;
            assert_eq!(outcome.status, DispatchStatus::HandleFailed);
            assert_eq!(outcome.deleted, expect_deleted);
        }
    }

    #[tokio::test]
    async fn retained_message_is_delivered_again() {
        let queue = Arc::new(InMemoryQueue::new());
        let handler = Arc::new(FailsOnce::default());
        let mut dispatcher = MessageDispatcher::new(queue.clone(), FailurePolicy::Retain);
        dispatcher.register("t.v1", handler.clone());

        let body = r#"{"type":"t.v1","id":"1","data":{}}"#;
        let first = receive_one(&queue, body).await;
        let outcome = dispatcher.dispatch(&first.body, &first.receipt_handle, IN).await;
        assert_eq!(outcome.status, DispatchStatus::HandleFailed);
        assert!(!outcome.deleted);
        assert_eq!(queue.in_flight_count(IN), 1);

        // Visibility timeout elapses.
        assert_eq!(queue.requeue_in_flight(IN), 1);
        let second = queue.receive(IN, 1, Duration::ZERO).await.expect("receive").remove(0);
        assert_eq!(second.body, body);
        assert_ne!(second.receipt_handle, first.receipt_handle);

        let outcome = dispatcher.dispatch(&second.body, &second.receipt_handle, IN).await;
        assert_eq!(outcome.status, DispatchStatus::Handled);
        assert!(outcome.deleted);
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(queue.in_flight_count(IN), 0);
        assert!(queue.pending_bodies(IN).is_empty());
    }

    #[tokio::test]
    async fn stale_receipt_is_reported_not_raised() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut dispatcher = MessageDispatcher::new(queue.clone(), FailurePolicy::Delete);
        dispatcher.register("t.v1", Arc::new(Counting::default()));

        let msg = receive_one(&queue, r#"{"type":"t.v1","id":"1"}"#).await;
        let first = dispatcher.dispatch(&msg.body, &msg.receipt_handle, IN).await;
        let again = dispatcher.dispatch(&msg.body, &msg.receipt_handle, IN).await;

        assert!(first.deleted);
        assert_eq!(again.status, DispatchStatus::Handled);
        assert!(!again.deleted);
    }

    #[test]
    fn registering_twice_replaces_the_route() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut dispatcher = MessageDispatcher::new(queue, FailurePolicy::Delete);
        dispatcher.register("a", Arc::new(Failing)).register("a", Arc::new(Counting::default()));
        dispatcher.register("b", Arc::new(Failing));

        assert_eq!(dispatcher.routes(), ["a", "b"]);
    }
}
