//! Worker pool: one consumer per worker, prefetch 1, manual acknowledgement.
//!
//! Shutdown: [`TranscodeWorkerPool::shutdown`] stops workers from taking new jobs and
//! waits up to the drain timeout for jobs already in progress. Jobs still running when
//! the timeout expires are abandoned unacknowledged, so the broker redelivers them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use imgnow_broker::{
    BrokerError, ConsumeOptions, Delivery, DeliveryStream, MessageBroker, OutboundMessage,
    QueueOptions, TranscodeMessage,
};
use imgnow_processing::Transcoder;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

/// How a job delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Reply published, job acknowledged.
    Completed,
    /// Job dropped for good: unparseable, no reply destination, or transcode failure.
    Rejected,
    /// Reply could not be published; the job goes back on the queue.
    Requeued,
}

pub struct TranscodeWorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    queue: String,
}

impl TranscodeWorkerPool {
    /// Declare `queue` and start `num_workers` workers consuming from it.
    pub async fn start(
        broker: Arc<dyn MessageBroker>,
        queue: &str,
        transcoder: Arc<dyn Transcoder>,
        num_workers: usize,
    ) -> Result<Self, BrokerError> {
        broker
            .declare_queue(queue, QueueOptions::work_queue())
            .await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let deliveries = broker
                .consume(
                    queue,
                    &format!("imgnow-worker-{}", worker_id),
                    ConsumeOptions::manual_ack(1),
                )
                .await?;

            handles.push(tokio::spawn(run_worker(
                worker_id,
                deliveries,
                broker.clone(),
                transcoder.clone(),
                shutdown_rx.clone(),
            )));
        }

        tracing::info!(
            queue = %queue,
            num_workers = num_workers,
            "Transcode worker pool started"
        );

        Ok(Self {
            shutdown_tx,
            handles,
            queue: queue.to_string(),
        })
    }

    pub fn num_workers(&self) -> usize {
        self.handles.len()
    }

    /// Stop taking jobs and wait up to `drain` for in-flight jobs.
    pub async fn shutdown(self, drain: Duration) {
        tracing::info!(queue = %self.queue, "Transcode worker pool shutting down");
        let _ = self.shutdown_tx.send(true);

        let aborts: Vec<AbortHandle> = self.handles.iter().map(|h| h.abort_handle()).collect();
        let joined = tokio::time::timeout(drain, futures::future::join_all(self.handles)).await;

        match joined {
            Ok(_) => tracing::info!("Transcode worker pool stopped"),
            Err(_) => {
                tracing::warn!(
                    drain_seconds = drain.as_secs(),
                    "Drain timeout reached, abandoning in-flight jobs"
                );
                for abort in aborts {
                    abort.abort();
                }
            }
        }
    }
}

async fn run_worker(
    worker_id: usize,
    mut deliveries: DeliveryStream,
    broker: Arc<dyn MessageBroker>,
    transcoder: Arc<dyn Transcoder>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::debug!(worker_id = worker_id, "Worker started");

    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            next = deliveries.next() => match next {
                Some(Ok(delivery)) => {
                    handle_delivery(worker_id, delivery, broker.as_ref(), transcoder.as_ref()).await;
                }
                Some(Err(e)) => {
                    tracing::warn!(worker_id = worker_id, error = %e, "Consumer error");
                }
                None => {
                    tracing::warn!(worker_id = worker_id, "Consumer stream closed");
                    break;
                }
            }
        }
    }

    tracing::debug!(worker_id = worker_id, "Worker stopped");
}

/// Process one job delivery and settle it with the broker.
#[tracing::instrument(skip(delivery, broker, transcoder), fields(request_id))]
pub async fn handle_delivery(
    worker_id: usize,
    delivery: Delivery,
    broker: &dyn MessageBroker,
    transcoder: &dyn Transcoder,
) -> JobOutcome {
    let job = match TranscodeMessage::from_json(&delivery.body) {
        Ok(job) => job,
        Err(e) => {
            tracing::error!(error = %e, "Malformed transcode job, rejecting");
            return settle(delivery, JobOutcome::Rejected).await;
        }
    };
    tracing::Span::current().record("request_id", job.request_id.as_str());

    let Some(reply_to) = delivery.reply_to.clone() else {
        tracing::error!("Transcode job has no reply destination, rejecting");
        return settle(delivery, JobOutcome::Rejected).await;
    };

    let start = Instant::now();
    let input_bytes = job.content.len();
    let output = match transcoder.transcode(job.content).await {
        Ok(output) => output,
        Err(e) => {
            tracing::error!(
                error = %e,
                filename = %job.filename,
                size_bytes = input_bytes,
                "Transcode failed, rejecting job"
            );
            return settle(delivery, JobOutcome::Rejected).await;
        }
    };

    tracing::info!(
        filename = %job.filename,
        input_bytes = input_bytes,
        output_bytes = output.len(),
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Transcode finished"
    );

    let reply = TranscodeMessage {
        filename: format!("{}.mp4", job.request_id),
        content: output,
        request_id: job.request_id,
    };
    let published = match reply.to_json() {
        Ok(body) => broker
            .publish(&reply_to, OutboundMessage::json(body).persistent())
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match published {
        Ok(()) => settle(delivery, JobOutcome::Completed).await,
        Err(e) => {
            tracing::error!(error = %e, reply_to = %reply_to, "Failed to publish reply, requeueing job");
            settle(delivery, JobOutcome::Requeued).await
        }
    }
}

async fn settle(delivery: Delivery, outcome: JobOutcome) -> JobOutcome {
    let result = match outcome {
        JobOutcome::Completed => delivery.ack().await,
        JobOutcome::Rejected => delivery.reject(false).await,
        JobOutcome::Requeued => delivery.reject(true).await,
    };
    if let Err(e) = result {
        tracing::error!(error = %e, outcome = ?outcome, "Failed to settle delivery");
    }
    outcome
}
