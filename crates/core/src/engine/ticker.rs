use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::controller::CongestionCore;
use crate::time::TimeSource;

/// Handle to the background task driving [`CongestionCore::tick`].
///
/// Dropping the handle also ends the task, but without waiting for it; call
/// [`stop`](Self::stop) to join.
#[derive(Debug)]
pub struct TickerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TickerHandle {
    /// Signals the task and waits for it to exit. A tick already running
    /// completes first.
    pub async fn stop(self) {
        if self.shutdown.send(()).is_err() {
            tracing::debug!("Ticker already exited");
        }
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "Ticker task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T: TimeSource> CongestionCore<T> {
    /// Spawns a task on the current tokio runtime that ticks the core every
    /// `period`. The first tick happens one period after spawning.
    ///
    /// A zero `period` falls back to the configured tick interval.
    pub fn spawn_ticker(self: &Arc<Self>, period: Duration) -> TickerHandle {
        let period = if period.is_zero() {
            let fallback = self.config().tick_interval();
            tracing::warn!(
                fallback_ms = fallback.as_millis() as u64,
                "Zero ticker period, using configured tick interval"
            );
            fallback
        } else {
            period
        };
        let (shutdown, mut stop) = oneshot::channel();
        let core = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = interval.tick() => {
                        if let Some(round) = core.tick() {
                            tracing::trace!(
                                total_target = round.total_target,
                                pacing_hint = round.pacing_hint,
                                "Ticker round"
                            );
                        }
                    }
                }
            }
            tracing::debug!(ticks = core.ticks(), "Ticker stopped");
        });
        tracing::debug!(period_ms = period.as_millis() as u64, "Ticker started");
        TickerHandle { shutdown, task }
    }
}
