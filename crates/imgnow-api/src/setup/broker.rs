//! Transcode broker setup
//!
//! With the AMQP backend, jobs go to RabbitMQ and the standalone worker binary does
//! the transcoding. With the memory backend, queues live in this process and an
//! embedded worker pool consumes them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use imgnow_broker::{AmqpBroker, MemoryBroker, MessageBroker, QueueOptions, TranscodeRpcClient};
use imgnow_core::{BrokerBackend, Config};
use imgnow_processing::FfmpegTranscoder;
use imgnow_worker::TranscodeWorkerPool;

/// Broker connection plus whatever must be stopped with it.
pub struct TranscodeBackend {
    broker: Arc<dyn MessageBroker>,
    amqp: Option<Arc<AmqpBroker>>,
    pool: Option<TranscodeWorkerPool>,
    queue: String,
}

impl TranscodeBackend {
    pub fn rpc_client(&self, timeout: Duration) -> TranscodeRpcClient {
        TranscodeRpcClient::new(self.broker.clone(), self.queue.clone(), timeout)
    }

    /// Stop the embedded pool (if any) and close the broker connection.
    pub async fn shutdown(self, drain: Duration) {
        if let Some(pool) = self.pool {
            pool.shutdown(drain).await;
        }
        if let Some(amqp) = self.amqp {
            if let Err(e) = amqp.close().await {
                tracing::warn!(error = %e, "Broker connection did not close cleanly");
            }
        }
    }
}

pub async fn setup_broker(config: &Config) -> Result<TranscodeBackend> {
    let queue = config.transcode_queue.clone();

    let backend = match config.broker_backend {
        BrokerBackend::Amqp => {
            let amqp = Arc::new(AmqpBroker::connect(&config.amqp_url).await?);
            let broker: Arc<dyn MessageBroker> = amqp.clone();
            TranscodeBackend {
                broker,
                amqp: Some(amqp),
                pool: None,
                queue,
            }
        }
        BrokerBackend::Memory => {
            let broker: Arc<dyn MessageBroker> = Arc::new(MemoryBroker::new());
            let transcoder = FfmpegTranscoder::new(&config.transcode)?;
            let pool = TranscodeWorkerPool::start(
                broker.clone(),
                &queue,
                Arc::new(transcoder),
                config.transcode.num_workers,
            )
            .await?;
            tracing::info!(
                num_workers = pool.num_workers(),
                "Using in-process broker with embedded transcode workers"
            );
            TranscodeBackend {
                broker,
                amqp: None,
                pool: Some(pool),
                queue,
            }
        }
    };

    // Publishing to a missing queue drops the job, so make sure it exists even
    // before any worker has started.
    backend
        .broker
        .declare_queue(&backend.queue, QueueOptions::work_queue())
        .await?;

    tracing::info!(
        backend = ?config.broker_backend,
        queue = %backend.queue,
        timeout_seconds = config.transcode_timeout_seconds,
        "Transcode broker ready"
    );

    Ok(backend)
}
