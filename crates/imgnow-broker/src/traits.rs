//! Broker abstraction trait

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream};

use crate::error::BrokerError;
use crate::protocol::JSON_CONTENT_TYPE;

/// Queue declaration flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    /// Remove the queue once its last consumer goes away.
    pub auto_delete: bool,
}

impl QueueOptions {
    /// Long-lived shared job queue.
    pub fn work_queue() -> Self {
        Self {
            durable: true,
            auto_delete: false,
        }
    }

    /// Per-request reply queue.
    pub fn reply_queue() -> Self {
        Self {
            durable: true,
            auto_delete: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeOptions {
    /// Maximum unacknowledged deliveries held by this consumer. `None` is unlimited.
    pub prefetch: Option<u16>,
    /// Deliveries count as acknowledged as soon as they are handed out.
    pub auto_ack: bool,
}

impl ConsumeOptions {
    pub fn auto_ack() -> Self {
        Self {
            prefetch: None,
            auto_ack: true,
        }
    }

    pub fn manual_ack(prefetch: u16) -> Self {
        Self {
            prefetch: Some(prefetch),
            auto_ack: false,
        }
    }
}

/// Message to publish on the default exchange, routed by queue name.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub content_type: String,
    pub reply_to: Option<String>,
    /// Survive a broker restart (delivery mode 2).
    pub persistent: bool,
}

impl OutboundMessage {
    pub fn json(body: Vec<u8>) -> Self {
        Self {
            body,
            content_type: JSON_CONTENT_TYPE.to_string(),
            reply_to: None,
            persistent: false,
        }
    }

    pub fn with_reply_to(mut self, queue: impl Into<String>) -> Self {
        self.reply_to = Some(queue.into());
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// Settles one delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;

    async fn reject(&self, requeue: bool) -> Result<(), BrokerError>;
}

/// Acknowledger for auto-ack consumers: there is nothing left to settle.
pub(crate) struct AutoAcked;

#[async_trait]
impl Acknowledger for AutoAcked {
    async fn ack(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn reject(&self, _requeue: bool) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// One received message.
pub struct Delivery {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub reply_to: Option<String>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        body: Vec<u8>,
        content_type: Option<String>,
        reply_to: Option<String>,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            body,
            content_type,
            reply_to,
            acker,
        }
    }

    pub async fn ack(self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    /// Reject the delivery; with `requeue` it goes back on its queue for redelivery.
    pub async fn reject(self, requeue: bool) -> Result<(), BrokerError> {
        self.acker.reject(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("body_bytes", &self.body.len())
            .field("content_type", &self.content_type)
            .field("reply_to", &self.reply_to)
            .finish()
    }
}

/// Consumer stream. Dropping it cancels the consumer.
pub struct DeliveryStream {
    inner: BoxStream<'static, Result<Delivery, BrokerError>>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl fmt::Debug for DeliveryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryStream")
            .field("cancels_on_drop", &self.on_drop.is_some())
            .finish_non_exhaustive()
    }
}

impl DeliveryStream {
    pub fn new(inner: BoxStream<'static, Result<Delivery, BrokerError>>) -> Self {
        Self {
            inner,
            on_drop: None,
        }
    }

    /// Run `f` when the consumer is dropped.
    pub fn on_drop(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_drop = Some(Box::new(f));
        self
    }
}

impl Stream for DeliveryStream {
    type Item = Result<Delivery, BrokerError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for DeliveryStream {
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f();
        }
    }
}

/// Message broker abstraction.
///
/// Publishing always goes through the default exchange, so the routing key is the
/// destination queue name. Publishing to a queue that does not exist drops the
/// message.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Declare a queue; declaring an existing queue is a no-op.
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<(), BrokerError>;

    /// Start a consumer on `queue`.
    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: ConsumeOptions,
    ) -> Result<DeliveryStream, BrokerError>;

    async fn publish(&self, queue: &str, message: OutboundMessage) -> Result<(), BrokerError>;

    /// Delete a queue. Deleting a missing queue is not an error.
    async fn delete_queue(&self, name: &str) -> Result<(), BrokerError>;
}
