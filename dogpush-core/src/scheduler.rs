use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};

use crate::reporter::DatadogReporter;
use crate::transport::Transport;

/// Handle to a reporter running on a fixed period.
///
/// Dropping the handle without calling [`ReporterHandle::shutdown`] aborts the
/// reporting task.
pub struct ReporterHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl<T> DatadogReporter<T>
where
    T: Transport + 'static,
{
    /// Runs a pass every `period`, starting one period from now.
    ///
    /// Each pass is awaited before the next tick is taken, so passes never
    /// overlap; a slow pass delays the following ones.
    pub fn start(self: Arc<Self>, period: Duration) -> ReporterHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {
                        let report = self.run().await;
                        tracing::debug!(outcome = ?report.outcome, "reporting pass finished");
                    }
                }
            }
        });

        ReporterHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

impl ReporterHandle {
    /// Stops scheduling passes. A pass already in flight runs to completion.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ReporterHandle {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
