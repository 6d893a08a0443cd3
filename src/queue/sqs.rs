use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::config::{Credentials, Region};
use aws_sdk_sqs::error::{DisplayErrorContext, SdkError};
use aws_sdk_sqs::operation::delete_message::DeleteMessageError;
use aws_sdk_sqs::types::Message;
use aws_sdk_sqs::Client;
use log::{debug, info, warn};

use crate::configuration::config::Config;
use crate::error::QueueError;
use crate::queue::{QueueClient, RawMessage};

// --------------------------------------------------------------------------------------------------------------
// Amazon SQS (or an emulator such as LocalStack) through the AWS SDK.
//
// An empty `endpoint_url` talks to the regional AWS endpoint; an empty `access_key_id`
// falls back to the SDK's default credential chain.
// --------------------------------------------------------------------------------------------------------------

const CREDENTIALS_PROVIDER: &str = "energy-fleet-config";

/// SQS hands out at most 10 messages per receive and long-polls for at most 20 s.
const MAX_BATCH:        u32 = 10;
const MAX_WAIT_SECONDS: u64 = 20;

pub struct SqsQueue {
    client: Client,
}

impl SqsQueue {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build the SDK client from the endpoint, region and static credentials in `config`.
    pub async fn from_config(config: &Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if !config.endpoint_url.is_empty() {
            loader = loader.endpoint_url(&config.endpoint_url);
        }
        if !config.access_key_id.is_empty() {
            loader = loader.credentials_provider(Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None,
                None,
                CREDENTIALS_PROVIDER,
            ));
        }

        let shared = loader.load().await;
        info!(
            "[Queue] SQS client for region {} (endpoint {})",
            config.region,
            if config.endpoint_url.is_empty() { "AWS default" } else { config.endpoint_url.as_str() }
        );
        Self::new(Client::new(&shared))
    }
}

/// Any SDK failure: transport, timeout, unreadable response or service fault.
fn sdk_failure<E>(action: &'static str, err: SdkError<E>) -> QueueError
where
    E: std::error::Error + 'static,
{
    QueueError::Sdk { action, message: DisplayErrorContext(err).to_string() }
}

fn delete_failure(receipt_handle: &str, err: SdkError<DeleteMessageError>) -> QueueError {
    if err.as_service_error().is_some_and(DeleteMessageError::is_receipt_handle_is_invalid) {
        return QueueError::InvalidReceipt(receipt_handle.to_string());
    }
    sdk_failure("DeleteMessage", err)
}

/// A delivery without a receipt handle can never be deleted; it is skipped.
fn into_raw(message: Message) -> Option<RawMessage> {
    match message.receipt_handle {
        Some(receipt_handle) => Some(RawMessage { body: message.body.unwrap_or_default(), receipt_handle }),
        None => {
            warn!("[Queue] Message {:?} arrived without a receipt handle, skipped", message.message_id);
            None
        }
    }
}

#[async_trait]
impl QueueClient for SqsQueue {
    async fn receive(&self, queue_id: &str, max_messages: u32, wait: Duration) -> Result<Vec<RawMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(queue_id)
            .max_number_of_messages(max_messages.clamp(1, MAX_BATCH) as i32)
            .wait_time_seconds(wait.as_secs().min(MAX_WAIT_SECONDS) as i32)
            .send()
            .await
            .map_err(|e| sdk_failure("ReceiveMessage", e))?;

        let messages: Vec<RawMessage> = output.messages.unwrap_or_default().into_iter().filter_map(into_raw).collect();
        debug!("[Queue] ReceiveMessage returned {} message(s)", messages.len());
        Ok(messages)
    }

    async fn send(&self, queue_id: &str, body: String) -> Result<(), QueueError> {
        self.client
            .send_message()
            .queue_url(queue_id)
            .message_body(body)
            .send()
            .await
            .map_err(|e| sdk_failure("SendMessage", e))?;
        Ok(())
    }

    async fn delete(&self, queue_id: &str, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(queue_id)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| delete_failure(receipt_handle, e))?;
        Ok(())
    }
}

// --------------------------------------------------------------------------------------------------------------
