//! Blocking transcode request/reply over the broker

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use imgnow_core::identifier::{generate_identifier, REQUEST_ID_LEN};

use crate::error::TranscodeError;
use crate::protocol::{job_filename, reply_queue_name, TranscodeMessage};
use crate::traits::{ConsumeOptions, DeliveryStream, MessageBroker, OutboundMessage, QueueOptions};

/// Transcoded video returned by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutput {
    pub content: Vec<u8>,
    pub len: usize,
}

/// Publishes a transcode job and waits for the reply carrying the same request id.
#[derive(Clone)]
pub struct TranscodeRpcClient {
    broker: Arc<dyn MessageBroker>,
    work_queue: String,
    timeout: Duration,
}

impl TranscodeRpcClient {
    pub fn new(broker: Arc<dyn MessageBroker>, work_queue: impl Into<String>, timeout: Duration) -> Self {
        Self {
            broker,
            work_queue: work_queue.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[tracing::instrument(skip(self, content), fields(work_queue = %self.work_queue, size_bytes = content.len(), request_id))]
    pub async fn transcode(
        &self,
        original_name: &str,
        content: Vec<u8>,
    ) -> Result<TranscodeOutput, TranscodeError> {
        let request_id = generate_identifier(REQUEST_ID_LEN);
        tracing::Span::current().record("request_id", request_id.as_str());
        let reply_queue = reply_queue_name(&request_id);

        self.broker
            .declare_queue(&reply_queue, QueueOptions::reply_queue())
            .await?;

        let result = self
            .round_trip(&request_id, &reply_queue, original_name, content)
            .await;

        // The queue auto-deletes once its consumer is gone; deleting it here just
        // avoids waiting for that.
        if let Err(e) = self.broker.delete_queue(&reply_queue).await {
            tracing::warn!(error = %e, queue = %reply_queue, "Failed to delete reply queue");
        }

        result
    }

    async fn round_trip(
        &self,
        request_id: &str,
        reply_queue: &str,
        original_name: &str,
        content: Vec<u8>,
    ) -> Result<TranscodeOutput, TranscodeError> {
        // Consume before publishing so a fast reply cannot arrive unobserved.
        let mut replies = self
            .broker
            .consume(
                reply_queue,
                &format!("imgnow-rpc-{}", request_id),
                ConsumeOptions::auto_ack(),
            )
            .await?;

        let request = TranscodeMessage {
            filename: job_filename(request_id, original_name),
            content,
            request_id: request_id.to_string(),
        };
        let body = request.to_json()?;

        self.broker
            .publish(
                &self.work_queue,
                OutboundMessage::json(body).with_reply_to(reply_queue),
            )
            .await?;

        tracing::debug!("Transcode job published, waiting for reply");

        match tokio::time::timeout(self.timeout, wait_for_reply(&mut replies, request_id)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_seconds = self.timeout.as_secs(),
                    "Transcode reply timed out"
                );
                Err(TranscodeError::Timeout {
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }
}

/// Read replies until one carries `request_id`; anything else is skipped.
async fn wait_for_reply(
    replies: &mut DeliveryStream,
    request_id: &str,
) -> Result<TranscodeOutput, TranscodeError> {
    while let Some(delivery) = replies.next().await {
        let delivery = delivery?;
        match TranscodeMessage::from_json(&delivery.body) {
            Ok(reply) if reply.request_id == request_id => {
                let len = reply.content.len();
                tracing::debug!(size_bytes = len, "Transcode reply received");
                return Ok(TranscodeOutput {
                    content: reply.content,
                    len,
                });
            }
            Ok(reply) => {
                tracing::debug!(
                    other_request_id = %reply.request_id,
                    "Ignoring reply for another request"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed transcode reply");
            }
        }
    }

    Err(TranscodeError::ReplyQueueClosed)
}
