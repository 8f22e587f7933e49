//! LivenessMonitor - reclaims attempts whose worker went silent.
//!
//! An attempt is stalled when neither a keepalive nor its start falls inside
//! the worker timeout. Stalled attempts are failed with reason "timeout"
//! through the regular fail path, so retry accounting is the same as for a
//! worker-reported failure.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::app::lifecycle::AttemptLifecycle;
use crate::domain::{FailureOutcome, Result};
use crate::ports::{Clock, TaskStore};

pub const TIMEOUT_REASON: &str = "timeout";

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Stalled attempts failed by this sweep.
    pub reclaimed: usize,
    pub retried: usize,
    pub exhausted: usize,
    /// Active workers not seen within the timeout.
    pub stale_workers: usize,
}

pub struct LivenessMonitor {
    store: Arc<dyn TaskStore>,
    lifecycle: Arc<AttemptLifecycle>,
    clock: Arc<dyn Clock>,
    timeout: chrono::Duration,
    interval: Duration,
}

impl LivenessMonitor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        lifecycle: Arc<AttemptLifecycle>,
        clock: Arc<dyn Clock>,
        timeout: chrono::Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            lifecycle,
            clock,
            timeout,
            interval,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        let cutoff = now - self.timeout;

        for attempt in self.store.stalled_attempts(cutoff).await? {
            let outcome = self
                .lifecycle
                .fail_if_stalled(attempt.id, cutoff, TIMEOUT_REASON)
                .await?;
            // Kept alive, completed or failed by the worker since the query.
            let Some(outcome) = outcome else {
                continue;
            };
            if matches!(outcome, FailureOutcome::AlreadyEnded { .. }) {
                continue;
            }

            report.reclaimed += 1;
            if outcome.is_exhausted() {
                report.exhausted += 1;
            } else {
                report.retried += 1;
            }
            warn!(
                task_id = %attempt.task_id,
                attempt_id = %attempt.id,
                last_activity = ?attempt.last_activity(),
                "attempt timed out"
            );
        }

        report.stale_workers = self
            .store
            .snapshot()
            .await?
            .workers
            .iter()
            .filter(|w| w.is_active() && !w.is_alive(now, self.timeout))
            .count();

        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match self.sweep().await {
                Ok(report) if report.reclaimed > 0 => {
                    info!(
                        reclaimed = report.reclaimed,
                        retried = report.retried,
                        exhausted = report.exhausted,
                        "liveness sweep reclaimed attempts"
                    );
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "liveness sweep failed"),
            }
        }
    }
}
