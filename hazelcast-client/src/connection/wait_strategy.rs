//! Backoff pacing between cluster connection attempts.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::config::{ConnectionRetryConfig, FAILOVER_CLUSTER_CONNECT_TIMEOUT};

/// Exponential backoff with jitter, bounded by a total time budget.
///
/// One strategy paces one attempt sequence against one candidate cluster;
/// [`reset`](Self::reset) starts a fresh sequence.
#[derive(Debug)]
pub struct WaitStrategy {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter: f64,
    cluster_connect_timeout: Option<Duration>,
    attempt: u32,
    current_backoff: Duration,
    started_at: Instant,
}

impl WaitStrategy {
    /// Creates a wait strategy; `None` leaves the time budget unbounded.
    pub fn new(
        initial_backoff: Duration,
        max_backoff: Duration,
        multiplier: f64,
        jitter: f64,
        cluster_connect_timeout: Option<Duration>,
    ) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            multiplier,
            jitter,
            cluster_connect_timeout,
            attempt: 0,
            current_backoff: initial_backoff,
            started_at: Instant::now(),
        }
    }

    /// Creates a wait strategy from retry settings. When a failover
    /// configuration is in use an unbounded budget becomes 120 seconds so
    /// the client can move on to the next cluster.
    pub fn from_config(config: &ConnectionRetryConfig, failover: bool) -> Self {
        let timeout = match config.cluster_connect_timeout() {
            Some(timeout) => Some(timeout),
            None if failover => Some(FAILOVER_CLUSTER_CONNECT_TIMEOUT),
            None => None,
        };
        Self::new(
            config.initial_backoff(),
            config.max_backoff(),
            config.multiplier(),
            config.jitter(),
            timeout,
        )
    }

    /// Starts a fresh attempt sequence.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_backoff = self.initial_backoff;
        self.started_at = Instant::now();
    }

    /// Returns the number of sleeps requested since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the unjittered backoff the next sleep starts from.
    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }

    /// Sleeps before the next attempt.
    ///
    /// Returns `false` without sleeping once the time budget is spent.
    pub async fn sleep(&mut self) -> bool {
        self.attempt += 1;
        let elapsed = self.started_at.elapsed();

        let Some(delay) = self.next_delay(elapsed, rand::thread_rng().gen::<f64>()) else {
            tracing::warn!(
                attempt = self.attempt,
                elapsed = ?elapsed,
                timeout = ?self.cluster_connect_timeout,
                "unable to get live cluster connection, cluster connect timeout reached"
            );
            return false;
        };

        tracing::debug!(
            attempt = self.attempt,
            elapsed = ?elapsed,
            sleep = ?delay,
            "unable to get live cluster connection, retrying"
        );

        tokio::time::sleep(delay).await;
        self.current_backoff = self.current_backoff.mul_f64(self.multiplier).min(self.max_backoff);
        true
    }

    /// Computes the jittered delay for `elapsed` time spent so far, or
    /// `None` if the budget is exhausted. `random` is uniform in `[0, 1)`.
    fn next_delay(&self, elapsed: Duration, random: f64) -> Option<Duration> {
        let remaining = match self.cluster_connect_timeout {
            Some(timeout) if elapsed >= timeout => return None,
            Some(timeout) => Some(timeout - elapsed),
            None => None,
        };

        let backoff = self.current_backoff.as_secs_f64();
        let jittered = backoff * (1.0 - self.jitter) + backoff * self.jitter * random;
        let delay = Duration::from_secs_f64(jittered.max(0.0));

        Some(match remaining {
            Some(remaining) => delay.min(remaining),
            None => delay,
        })
    }
}
