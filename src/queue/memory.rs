use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

use crate::error::QueueError;
use crate::queue::{QueueClient, RawMessage};

// --------------------------------------------------------------------------------------------------------------

#[derive(Default)]
struct NamedQueue {
    pending:   VecDeque<String>,
    /// receipt handle -> body, for messages received but not yet deleted.
    in_flight: HashMap<String, String>,
}

/// Process-local queue set. Queues are created on first use.
///
/// Received messages stay in flight until deleted; `requeue_in_flight` makes them visible
/// again, standing in for a visibility timeout.
#[derive(Default)]
pub struct InMemoryQueue {
    queues:   Mutex<HashMap<String, NamedQueue>>,
    arrivals: Notify,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, NamedQueue>> {
        // A panic while holding the lock cannot leave the maps half-updated.
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a body without going through the async trait, handy for seeding.
    pub fn push(&self, queue_id: &str, body: impl Into<String>) {
        self.lock().entry(queue_id.to_string()).or_default().pending.push_back(body.into());
        self.arrivals.notify_waiters();
    }

    /// Bodies waiting to be received, oldest first.
    pub fn pending_bodies(&self, queue_id: &str) -> Vec<String> {
        self.lock()
            .get(queue_id)
            .map(|q| q.pending.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn in_flight_count(&self, queue_id: &str) -> usize {
        self.lock().get(queue_id).map(|q| q.in_flight.len()).unwrap_or(0)
    }

    /// Put every undeleted delivery of `queue_id` back at the front of the queue.
    pub fn requeue_in_flight(&self, queue_id: &str) -> usize {
        let mut queues = self.lock();
        let Some(queue) = queues.get_mut(queue_id) else {
            return 0;
        };
        let returned: Vec<String> = queue.in_flight.drain().map(|(_, body)| body).collect();
        let count = returned.len();
        for body in returned.into_iter().rev() {
            queue.pending.push_front(body);
        }
        drop(queues);
        if count > 0 {
            self.arrivals.notify_waiters();
        }
        count
    }

    fn take_batch(&self, queue_id: &str, max_messages: u32) -> Vec<RawMessage> {
        let mut queues = self.lock();
        let queue = queues.entry(queue_id.to_string()).or_default();
        let mut batch = Vec::new();

        while batch.len() < max_messages as usize {
            let Some(body) = queue.pending.pop_front() else { break };
            let receipt_handle = Uuid::new_v4().to_string();
            queue.in_flight.insert(receipt_handle.clone(), body.clone());
            batch.push(RawMessage { body, receipt_handle });
        }
        batch
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn receive(&self, queue_id: &str, max_messages: u32, wait: Duration) -> Result<Vec<RawMessage>, QueueError> {
        let deadline = Instant::now() + wait;

        loop {
            // Registered before checking so a push in between is not missed.
            let arrived = self.arrivals.notified();

            let batch = self.take_batch(queue_id, max_messages.max(1));
            if !batch.is_empty() {
                debug!("[Queue] {} message(s) handed out from '{}'", batch.len(), queue_id);
                return Ok(batch);
            }
            if timeout_at(deadline, arrived).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn send(&self, queue_id: &str, body: String) -> Result<(), QueueError> {
        self.push(queue_id, body);
        Ok(())
    }

    async fn delete(&self, queue_id: &str, receipt_handle: &str) -> Result<(), QueueError> {
        let mut queues = self.lock();
        let queue = queues
            .get_mut(queue_id)
            .ok_or_else(|| QueueError::UnknownQueue(queue_id.to_string()))?;

        match queue.in_flight.remove(receipt_handle) {
            Some(_) => Ok(()),
            None => Err(QueueError::InvalidReceipt(receipt_handle.to_string())),
        }
    }
}

// --------------------------------------------------------------------------------------------------------------
