//! RabbitMQ broker over AMQP 0-9-1
//!
//! One connection per process. Publishing shares a single confirm-mode channel;
//! every consumer gets its own channel so its QoS (prefetch) applies to it alone,
//! and the channel is closed when the consumer stream is dropped.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

use crate::error::BrokerError;
use crate::traits::{
    Acknowledger, AutoAcked, ConsumeOptions, Delivery, DeliveryStream, MessageBroker,
    OutboundMessage, QueueOptions,
};

const PERSISTENT_DELIVERY_MODE: u8 = 2;

pub struct AmqpBroker {
    connection: Connection,
    publish_channel: Channel,
}

impl AmqpBroker {
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let start = std::time::Instant::now();

        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let publish_channel = connection.create_channel().await?;
        publish_channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        tracing::info!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Connected to AMQP broker"
        );

        Ok(Self {
            connection,
            publish_channel,
        })
    }

    /// Close the connection; unacknowledged deliveries go back to their queues.
    pub async fn close(&self) -> Result<(), BrokerError> {
        self.connection
            .close(200, "shutdown")
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))
    }
}

struct AmqpAcker {
    acker: Acker,
}

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    async fn reject(&self, requeue: bool) -> Result<(), BrokerError> {
        self.acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }
}

#[async_trait]
impl MessageBroker for AmqpBroker {
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<(), BrokerError> {
        self.publish_channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: options.durable,
                    auto_delete: options.auto_delete,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: ConsumeOptions,
    ) -> Result<DeliveryStream, BrokerError> {
        let channel = self.connection.create_channel().await?;

        if let Some(prefetch) = options.prefetch {
            channel
                .basic_qos(prefetch, BasicQosOptions::default())
                .await?;
        }

        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: options.auto_ack,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume(e.to_string()))?;

        let auto_ack = options.auto_ack;
        let stream = StreamExt::map(consumer, move |result| -> Result<Delivery, BrokerError> {
            let delivery = result.map_err(|e| BrokerError::Consume(e.to_string()))?;
            let acker: Box<dyn Acknowledger> = if auto_ack {
                Box::new(AutoAcked)
            } else {
                Box::new(AmqpAcker {
                    acker: delivery.acker,
                })
            };
            Ok(Delivery::new(
                delivery.data,
                delivery
                    .properties
                    .content_type()
                    .as_ref()
                    .map(|ct| ct.as_str().to_string()),
                delivery
                    .properties
                    .reply_to()
                    .as_ref()
                    .map(|r| r.as_str().to_string()),
                acker,
            ))
        })
        .boxed();

        let tag = consumer_tag.to_string();
        Ok(DeliveryStream::new(stream).on_drop(move || {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = channel.close(200, "consumer dropped").await {
                        tracing::debug!(error = %e, consumer_tag = %tag, "Consumer channel close failed");
                    }
                });
            }
        }))
    }

    async fn publish(&self, queue: &str, message: OutboundMessage) -> Result<(), BrokerError> {
        let mut properties =
            BasicProperties::default().with_content_type(ShortString::from(message.content_type));
        if let Some(reply_to) = message.reply_to {
            properties = properties.with_reply_to(ShortString::from(reply_to));
        }
        if message.persistent {
            properties = properties.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
        }

        let confirmation = self
            .publish_channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;

        if confirmation.is_nack() {
            return Err(BrokerError::Publish(format!(
                "broker refused message for queue {}",
                queue
            )));
        }
        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.publish_channel
            .queue_delete(name, QueueDeleteOptions::default())
            .await?;
        Ok(())
    }
}
