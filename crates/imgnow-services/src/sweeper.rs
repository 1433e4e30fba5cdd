use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::retention::{RetentionEngine, SweepReport};

/// Records deleted per repository round trip.
const SWEEP_BATCH: i64 = 100;

/// Periodic background deletion of expired files.
#[derive(Clone)]
pub struct ExpirySweeper {
    retention: RetentionEngine,
    period: Duration,
}

impl ExpirySweeper {
    pub fn new(retention: RetentionEngine, period: Duration) -> Self {
        Self { retention, period }
    }

    /// Start the background sweep loop.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let report = self.run_once().await;
                if report.failed > 0 {
                    tracing::warn!(failed = report.failed, "Expiry sweep had failures");
                }
            }
        })
    }

    /// Sweep until the backlog of expired records is drained.
    pub async fn run_once(&self) -> SweepReport {
        let mut total = SweepReport::default();

        loop {
            let report = match self.retention.sweep_expired(SWEEP_BATCH).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(error = %e, "Expiry sweep failed");
                    break;
                }
            };

            total.found += report.found;
            total.deleted += report.deleted;
            total.failed += report.failed;

            // A short batch means the backlog is empty. A batch where nothing could be
            // deleted would come back identical, so stop there too.
            if report.found < SWEEP_BATCH as usize || report.deleted == 0 {
                break;
            }
        }

        total
    }
}
