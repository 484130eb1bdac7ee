//! Bounded readiness polling with exponential backoff
//!
//! Replaces fixed settle sleeps: callers probe an external resource until it
//! reports ready or the deadline passes. Polls are plain futures, so dropping
//! one (for example from a `tokio::select!` branch) cancels it.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Result of a readiness poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Probe reported ready
    Ready { attempts: u32, elapsed: Duration },
    /// Deadline passed without the probe reporting ready
    TimedOut { attempts: u32, elapsed: Duration },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Ready { attempts, .. } | PollOutcome::TimedOut { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Polling policy: overall timeout plus a doubling delay between probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPoll {
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReadinessPoll {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl ReadinessPoll {
    pub fn new(timeout: Duration, initial_backoff: Duration, max_backoff: Duration) -> Self {
        let initial_backoff = initial_backoff.max(Duration::from_millis(1));
        Self {
            timeout,
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_backoff)
    }

    /// Probe until it returns `true` or the timeout elapses.
    ///
    /// The probe always runs at least once, even with a zero timeout.
    pub async fn wait_until<F, Fut>(&self, mut probe: F) -> PollOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut delay = self.initial_backoff;
        let mut attempts = 0;

        loop {
            attempts += 1;
            if probe().await {
                return PollOutcome::Ready {
                    attempts,
                    elapsed: start.elapsed(),
                };
            }

            let now = Instant::now();
            if now >= deadline {
                return PollOutcome::TimedOut {
                    attempts,
                    elapsed: start.elapsed(),
                };
            }

            sleep(delay.min(deadline - now)).await;
            delay = self.next_backoff(delay);
        }
    }

    /// Watch a condition for the whole window.
    ///
    /// Returns `false` as soon as the probe reports `false`, `true` once the
    /// window has elapsed with the condition holding throughout.
    pub async fn hold_while<F>(&self, mut probe: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + self.timeout;
        let mut delay = self.initial_backoff;

        loop {
            if !probe() {
                return false;
            }

            let now = Instant::now();
            if now >= deadline {
                return true;
            }

            sleep(delay.min(deadline - now)).await;
            delay = self.next_backoff(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_poll(timeout_ms: u64) -> ReadinessPoll {
        ReadinessPoll::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(1),
            Duration::from_millis(4),
        )
    }

    #[tokio::test]
    async fn test_ready_on_first_probe() {
        let outcome = fast_poll(50).wait_until(|| async { true }).await;
        assert!(outcome.is_ready());
        assert_eq!(outcome.attempts(), 1);
    }

    #[tokio::test]
    async fn test_ready_after_several_probes() {
        let calls = Cell::new(0);
        let outcome = fast_poll(1_000)
            .wait_until(|| {
                calls.set(calls.get() + 1);
                let done = calls.get() >= 3;
                async move { done }
            })
            .await;
        assert!(outcome.is_ready());
        assert_eq!(outcome.attempts(), 3);
    }

    #[tokio::test]
    async fn test_times_out() {
        let outcome = fast_poll(20).wait_until(|| async { false }).await;
        assert!(!outcome.is_ready());
        assert!(outcome.attempts() >= 2);
    }

    #[tokio::test]
    async fn test_zero_timeout_still_probes_once() {
        let outcome = fast_poll(0).wait_until(|| async { false }).await;
        assert_eq!(outcome.attempts(), 1);
    }

    #[tokio::test]
    async fn test_hold_while_reports_early_failure() {
        let calls = Cell::new(0);
        let held = fast_poll(5_000)
            .hold_while(|| {
                calls.set(calls.get() + 1);
                calls.get() < 3
            })
            .await;
        assert!(!held);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_hold_while_holds_for_window() {
        assert!(fast_poll(15).hold_while(|| true).await);
    }

    #[test]
    fn test_backoff_is_capped() {
        let poll = ReadinessPoll::new(
            Duration::from_secs(1),
            Duration::from_millis(100),
            Duration::from_millis(300),
        );
        assert_eq!(poll.next_backoff(Duration::from_millis(100)), Duration::from_millis(200));
        assert_eq!(poll.next_backoff(Duration::from_millis(200)), Duration::from_millis(300));
    }
}
