//! In-process broker
//!
//! Queues are unbounded tokio channels shared by all consumers of the same queue.
//! Manual-ack consumers hold one semaphore permit per unsettled delivery, which is how
//! the prefetch limit is enforced. A delivery dropped without being settled goes back
//! on its queue, like an unacknowledged AMQP message when its channel closes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};

use crate::error::BrokerError;
use crate::traits::{
    Acknowledger, AutoAcked, ConsumeOptions, Delivery, DeliveryStream, MessageBroker,
    OutboundMessage, QueueOptions,
};

#[derive(Debug, Clone)]
struct StoredMessage {
    body: Vec<u8>,
    content_type: Option<String>,
    reply_to: Option<String>,
}

struct MemoryQueue {
    sender: mpsc::UnboundedSender<StoredMessage>,
    receiver: Arc<AsyncMutex<mpsc::UnboundedReceiver<StoredMessage>>>,
    auto_delete: bool,
    consumers: usize,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    acked: AtomicU64,
    rejected: AtomicU64,
    requeued: AtomicU64,
}

/// Settlement counters, for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub published: u64,
    pub acked: u64,
    pub rejected: u64,
    pub requeued: u64,
}

#[derive(Default)]
struct Shared {
    queues: Mutex<HashMap<String, MemoryQueue>>,
    counters: Counters,
}

impl Shared {
    fn queues(&self) -> MutexGuard<'_, HashMap<String, MemoryQueue>> {
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release_consumer(&self, queue: &str) {
        let mut queues = self.queues();
        let remove = match queues.get_mut(queue) {
            Some(q) => {
                q.consumers = q.consumers.saturating_sub(1);
                q.auto_delete && q.consumers == 0
            }
            None => false,
        };
        if remove {
            queues.remove(queue);
            tracing::debug!(queue = %queue, "Auto-deleted queue after last consumer");
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> BrokerStats {
        let c = &self.shared.counters;
        BrokerStats {
            published: c.published.load(Ordering::SeqCst),
            acked: c.acked.load(Ordering::SeqCst),
            rejected: c.rejected.load(Ordering::SeqCst),
            requeued: c.requeued.load(Ordering::SeqCst),
        }
    }

    pub fn queue_exists(&self, name: &str) -> bool {
        self.shared.queues().contains_key(name)
    }

    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.queues().keys().cloned().collect();
        names.sort();
        names
    }
}

struct MemoryAcker {
    message: StoredMessage,
    requeue_tx: mpsc::WeakUnboundedSender<StoredMessage>,
    shared: Arc<Shared>,
    settled: AtomicBool,
    // Released when the delivery is settled and dropped.
    _permit: Option<OwnedSemaphorePermit>,
}

impl MemoryAcker {
    fn requeue(&self) {
        match self.requeue_tx.upgrade() {
            Some(tx) if tx.send(self.message.clone()).is_ok() => {
                self.shared.counters.requeued.fetch_add(1, Ordering::SeqCst);
            }
            _ => tracing::debug!("Queue gone, dropping requeued message"),
        }
    }
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.settled.store(true, Ordering::SeqCst);
        self.shared.counters.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<(), BrokerError> {
        self.settled.store(true, Ordering::SeqCst);
        if requeue {
            self.requeue();
        } else {
            self.shared.counters.rejected.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        if !self.settled.load(Ordering::SeqCst) {
            self.requeue();
        }
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<(), BrokerError> {
        let mut queues = self.shared.queues();
        queues.entry(name.to_string()).or_insert_with(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            MemoryQueue {
                sender,
                receiver: Arc::new(AsyncMutex::new(receiver)),
                auto_delete: options.auto_delete,
                consumers: 0,
            }
        });
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: ConsumeOptions,
    ) -> Result<DeliveryStream, BrokerError> {
        let (receiver, requeue_tx) = {
            let mut queues = self.shared.queues();
            let q = queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
            q.consumers += 1;
            (q.receiver.clone(), q.sender.downgrade())
        };

        let auto_ack = options.auto_ack;
        let permits = options
            .prefetch
            .filter(|_| !auto_ack)
            .map(|n| Arc::new(Semaphore::new(usize::from(n.max(1)))));
        let shared = self.shared.clone();

        tracing::debug!(queue = %queue, consumer_tag = %consumer_tag, "Consumer started");

        let stream = futures::stream::unfold(
            (receiver, permits, requeue_tx, shared),
            move |(receiver, permits, requeue_tx, shared)| async move {
                let permit = match &permits {
                    Some(semaphore) => Some(semaphore.clone().acquire_owned().await.ok()?),
                    None => None,
                };
                let message = receiver.lock().await.recv().await?;

                let acker: Box<dyn Acknowledger> = if auto_ack {
                    Box::new(AutoAcked)
                } else {
                    Box::new(MemoryAcker {
                        message: message.clone(),
                        requeue_tx: requeue_tx.clone(),
                        shared: shared.clone(),
                        settled: AtomicBool::new(false),
                        _permit: permit,
                    })
                };
                let delivery =
                    Delivery::new(message.body, message.content_type, message.reply_to, acker);

                Some((Ok(delivery), (receiver, permits, requeue_tx, shared)))
            },
        )
        .boxed();

        let shared = self.shared.clone();
        let queue = queue.to_string();
        Ok(DeliveryStream::new(stream).on_drop(move || shared.release_consumer(&queue)))
    }

    async fn publish(&self, queue: &str, message: OutboundMessage) -> Result<(), BrokerError> {
        let queues = self.shared.queues();
        let Some(q) = queues.get(queue) else {
            tracing::debug!(queue = %queue, "No such queue, message dropped");
            return Ok(());
        };

        q.sender
            .send(StoredMessage {
                body: message.body,
                content_type: Some(message.content_type),
                reply_to: message.reply_to,
            })
            .map_err(|_| BrokerError::Publish(format!("queue {} is closed", queue)))?;
        self.shared.counters.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.shared.queues().remove(name);
        Ok(())
    }
}
