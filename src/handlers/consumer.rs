use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::configuration::config::Config;
use crate::handlers::dispatcher::{DispatchStatus, MessageDispatcher};
use crate::queue::QueueClient;

// --------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub queue_id:            String,
    pub max_messages:        u32,
    pub wait:                Duration,
    pub receive_error_pause: Duration,
}

impl ConsumerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            queue_id:            config.commands_queue_url.clone(),
            max_messages:        config.max_messages,
            wait:                config.wait_time(),
            receive_error_pause: config.receive_error_pause(),
        }
    }
}

/// Running totals, returned when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub batches:  u64,
    pub handled:  u64,
    pub failed:   u64,
    pub unknown:  u64,
}

// --------------------------------------------------------------------------------------------------------------

/// Receive → dispatch each message in order → repeat, until `shutdown` fires.
/// A failing receive is logged and retried after a short pause; no single message can end
/// the loop.
pub async fn run_consumer(
    queue: Arc<dyn QueueClient>,
    dispatcher: &MessageDispatcher,
    options: &ConsumerOptions,
    shutdown: CancellationToken,
) -> ConsumerStats {
    let mut stats = ConsumerStats::default();
    info!("[Consumer] Waiting for OnboardingRequest, OffboardingRequest or BatteryCommand...");

    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = queue.receive(&options.queue_id, options.max_messages, options.wait) => result,
        };

        let messages = match received {
            Ok(messages) => messages,
            Err(e) => {
                error!("[Consumer] Receive failed: {}", e);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(options.receive_error_pause) => continue,
                }
            }
        };

        if messages.is_empty() {
            info!("[Consumer] No messages received, continuing to poll...");
            continue;
        }

        stats.batches += 1;
        info!("[Consumer] Received {} message(s).", messages.len());

        // The batch is finished even when shutdown fires mid-way.
        for message in messages {
            let outcome = dispatcher.dispatch(&message.body, &message.receipt_handle, &options.queue_id).await;
            match outcome.status {
                DispatchStatus::Handled => stats.handled += 1,
                DispatchStatus::UnknownType => stats.unknown += 1,
                DispatchStatus::DecodeFailed | DispatchStatus::HandleFailed => stats.failed += 1,
            }
        }
    }

    info!(
        "[Consumer] Stopped after {} batch(es): {} handled, {} unknown, {} failed",
        stats.batches, stats.handled, stats.unknown, stats.failed
    );
    stats
}

// --------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::config::FailurePolicy;
    use crate::error::QueueError;
    use crate::queue::memory::InMemoryQueue;
    use crate::queue::RawMessage;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    const IN: &str = "commands-demo";

    /// In-memory queue whose first receive call fails. Records when each receive started.
    #[derive(Default)]
    struct FirstReceiveFails {
        inner:    InMemoryQueue,
        receives: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl QueueClient for FirstReceiveFails {
        async fn receive(&self, queue_id: &str, max_messages: u32, wait: Duration) -> Result<Vec<RawMessage>, QueueError> {
            let first = {
                let mut receives = self.receives.lock().expect("lock");
                receives.push(Instant::now());
                receives.len() == 1
            };
            if first {
                return Err(QueueError::UnknownQueue(queue_id.to_string()));
            }
            self.inner.receive(queue_id, max_messages, wait).await
        }

        async fn send(&self, queue_id: &str, body: String) -> Result<(), QueueError> {
            self.inner.send(queue_id, body).await
        }

        async fn delete(&self, queue_id: &str, receipt_handle: &str) -> Result<(), QueueError> {
            self.inner.delete(queue_id, receipt_handle).await
        }
    }

    fn options() -> ConsumerOptions {
        ConsumerOptions {
            queue_id:            IN.to_string(),
            max_messages:        5,
            wait:                Duration::from_secs(10),
            receive_error_pause: Duration::from_secs(5),
        }
    }

    fn stop_after(after: Duration) -> CancellationToken {
        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            sleep(after).await;
            stopper.cancel();
        });
        shutdown
    }

    #[tokio::test(start_paused = true)]
    async fn receive_error_pauses_then_polling_resumes() {
        let queue = Arc::new(FirstReceiveFails::default());
        queue.inner.push(IN, r#"{"type":"nobody.home","id":"1"}"#);
        let dispatcher = MessageDispatcher::new(queue.clone(), FailurePolicy::Delete);

        let stats = run_consumer(queue.clone(), &dispatcher, &options(), stop_after(Duration::from_secs(30))).await;

        assert_eq!(stats, ConsumerStats { batches: 1, handled: 0, failed: 0, unknown: 1 });
        assert_eq!(queue.inner.in_flight_count(IN), 0);

        let receives = queue.receives.lock().expect("lock").clone();
        assert!(receives.len() >= 2);
        assert!(receives[1] - receives[0] >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_error_pause_ends_the_loop() {
        let queue = Arc::new(FirstReceiveFails::default());
        let dispatcher = MessageDispatcher::new(queue.clone(), FailurePolicy::Delete);
        let started = Instant::now();

        let stats = run_consumer(queue.clone(), &dispatcher, &options(), stop_after(Duration::from_secs(2))).await;

        assert_eq!(stats, ConsumerStats::default());
        assert_eq!(queue.receives.lock().expect("lock").len(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
