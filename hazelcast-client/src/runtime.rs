//! Background task helpers.
//!
//! The client runs a few periodic jobs (the invocation sweep, heartbeats,
//! reconnecting to known members). Each one is owned through a
//! [`PeriodicTask`] handle that stops the job when cancelled or dropped.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Handle to a job that runs once per period until cancelled.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    cancelled: AtomicBool,
    stop: watch::Sender<bool>,
}

impl PeriodicTask {
    /// Spawns `job` to run every `period`, starting one period from now.
    ///
    /// A run that overlaps the next tick delays that tick instead of queueing it.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop, mut stop_rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => job().await,
                    _ = stop_rx.changed() => break,
                }
            }
            tracing::debug!(task = name, "periodic task stopped");
        });

        Self {
            name,
            cancelled: AtomicBool::new(false),
            stop,
        }
    }

    /// Returns the task name used in log output.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stops the task. Returns `false` if it was already cancelled.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.stop.send(true);
        true
    }

    /// Returns true once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_runs_every_period() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let task = PeriodicTask::spawn("test", Duration::from_millis(100), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(task.name(), "test");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_stops_runs() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let task = PeriodicTask::spawn("test", Duration::from_millis(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(task.cancel());
        assert!(!task.cancel());
        assert!(task.is_cancelled());

        let seen = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn test_periodic_task_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PeriodicTask>();
    }
}
