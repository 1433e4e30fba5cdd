use std::sync::Arc;
use std::time::Duration;

use imgnow_broker::{AmqpBroker, MessageBroker};
use imgnow_core::{telemetry, WorkerConfig};
use imgnow_processing::FfmpegTranscoder;
use imgnow_worker::TranscodeWorkerPool;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    telemetry::init_telemetry()
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let config = WorkerConfig::from_env()?;
    let transcoder = FfmpegTranscoder::new(&config.transcode)?;

    let broker = Arc::new(AmqpBroker::connect(&config.amqp_url).await?);
    let shared: Arc<dyn MessageBroker> = broker.clone();

    let pool = TranscodeWorkerPool::start(
        shared,
        &config.transcode_queue,
        Arc::new(transcoder),
        config.transcode.num_workers,
    )
    .await?;

    tracing::info!(
        queue = %config.transcode_queue,
        num_workers = pool.num_workers(),
        ffmpeg_path = %config.transcode.ffmpeg_path,
        preset = %config.transcode.preset,
        crf = config.transcode.crf,
        "Worker ready and consuming"
    );

    shutdown_signal().await;

    pool.shutdown(Duration::from_secs(config.drain_timeout_seconds))
        .await;

    if let Err(e) = broker.close().await {
        tracing::warn!(error = %e, "Broker connection did not close cleanly");
    }

    tracing::info!("Worker stopped");
    Ok(())
}

/// Resolves on Ctrl+C (SIGINT) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down, draining in-flight jobs...");
}
