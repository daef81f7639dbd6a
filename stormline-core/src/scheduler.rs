//! Fixed-period scheduler driving the orchestrator until cancelled.

use crate::pipeline::{CycleError, Orchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Repeats ingestion cycles on a fixed period, independently of manual
/// triggers against the same orchestrator.
///
/// The loop itself never fails: busy rejections (a manual cycle is running)
/// are skipped, failed cycles are logged and retried on the next tick. Once
/// the token is cancelled no new cycle starts; an in-flight cycle runs to
/// completion, bounded by the connector's request timeouts.
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    period: Duration,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, period: Duration) -> Self {
        Self {
            orchestrator,
            period,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = self.period.as_secs(), "scheduler.started");

        // Cancellation is terminal: build the owned ('static) future once and
        // reuse it so the select loop holds no borrowed future across a yield
        // point (which the spawned task's `Send` bound can't prove otherwise).
        let cancelled = cancel.cancelled_owned();
        tokio::pin!(cancelled);

        loop {
            tokio::select! {
                _ = &mut cancelled => {
                    info!("scheduler.stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.orchestrator.trigger().await {
                Ok(outcome) if outcome.success => {
                    info!(
                        cycle_id = %outcome.cycle_id,
                        processed = outcome.processed,
                        "scheduler.cycle.done"
                    );
                }
                Ok(outcome) => {
                    error!(
                        cycle_id = %outcome.cycle_id,
                        error = ?outcome.error,
                        "scheduler.cycle.failed"
                    );
                }
                Err(CycleError::Busy) => {
                    warn!("scheduler.cycle.skipped_busy");
                }
            }
        }
    }
}
