//! Bounded retry with a declarative backoff schedule.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use fleetscale_core::RetryPolicy;

/// The probe never succeeded within its attempt budget.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("probe still failing after {attempts} attempts")]
pub struct RetryExhausted {
    pub attempts: u32,
}

/// What bounds a [`Backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// Stop after this many failed attempts (at least one).
    Attempts(u32),
    /// Stop once this instant passes.
    Deadline(Instant),
}

/// Sleeps between failed attempts according to a [`RetryPolicy`].
#[derive(Debug)]
pub struct Backoff<'a> {
    policy: &'a RetryPolicy,
    budget: Budget,
    failures: u32,
}

impl<'a> Backoff<'a> {
    pub fn new(policy: &'a RetryPolicy, budget: Budget) -> Self {
        Self {
            policy,
            budget,
            failures: 0,
        }
    }

    /// Bounded by the policy's own attempt count.
    pub fn attempts(policy: &'a RetryPolicy) -> Self {
        Self::new(policy, Budget::Attempts(policy.attempts()))
    }

    /// Failed attempts recorded so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failed attempt and wait before the next one.
    ///
    /// Returns `false` without sleeping when the attempt budget is spent.
    /// Against a deadline, returns `false` once the deadline has been
    /// reached instead of sleeping past it.
    pub async fn wait(&mut self) -> bool {
        let delay = self.policy.delay_for_attempt(self.failures);
        self.failures += 1;

        match self.budget {
            Budget::Attempts(max) => {
                if self.failures >= max.max(1) {
                    return false;
                }
            }
            Budget::Deadline(deadline) => {
                let next = Instant::now().checked_add(delay);
                if next.is_none_or(|next| next >= deadline) {
                    tokio::time::sleep_until(deadline).await;
                    return false;
                }
            }
        }

        debug!(attempt = self.failures, delay_ms = delay.as_millis() as u64, "backing off");
        tokio::time::sleep(delay).await;
        true
    }
}

/// Call `probe` until it returns `true` or the policy's attempts run out.
///
/// Returns the number of attempts used. After the failed attempt with
/// index `i`, sleeps `policy.backoff[min(i, len - 1)]`; there is no sleep
/// after the final attempt.
pub async fn retry<F, Fut>(policy: &RetryPolicy, mut probe: F) -> Result<u32, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut backoff = Backoff::attempts(policy);
    loop {
        if probe().await {
            return Ok(backoff.failures() + 1);
        }
        if !backoff.wait().await {
            return Err(RetryExhausted {
                attempts: backoff.failures(),
            });
        }
    }
}

/// Sum of the waits a probe failing `failures` times will sleep.
pub fn total_delay(policy: &RetryPolicy, failures: u32) -> Duration {
    (0..failures).map(|i| policy.delay_for_attempt(i)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(5)],
            6,
        )
    }

    /// Probe that fails `k` times, then succeeds.
    fn flaky(k: u32) -> impl FnMut() -> std::future::Ready<bool> {
        let mut calls = 0;
        move || {
            calls += 1;
            std::future::ready(calls > k)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_first_try_without_sleeping() {
        let start = Instant::now();
        assert_eq!(retry(&policy(), flaky(0)).await, Ok(1));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_failures_with_summed_backoff() {
        for k in 0..6 {
            let start = Instant::now();
            assert_eq!(retry(&policy(), flaky(k)).await, Ok(k + 1));
            assert_eq!(start.elapsed(), total_delay(&policy(), k), "k = {k}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn last_backoff_is_reused() {
        let start = Instant::now();
        retry(&policy(), flaky(5)).await.unwrap();
        // 1 + 2 + 5 + 5 + 5
        assert_eq!(start.elapsed(), Duration::from_secs(18));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_budget() {
        let mut calls = 0;
        let start = Instant::now();
        let result = retry(&policy(), || {
            calls += 1;
            std::future::ready(false)
        })
        .await;

        assert_eq!(result, Err(RetryExhausted { attempts: 6 }));
        assert_eq!(calls, 6);
        // No sleep after the final attempt.
        assert_eq!(start.elapsed(), total_delay(&policy(), 5));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_probes_once() {
        let policy = RetryPolicy::new(Vec::new(), 0);
        assert_eq!(
            retry(&policy, flaky(3)).await,
            Err(RetryExhausted { attempts: 1 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_budget_stops_at_deadline() {
        let policy = RetryPolicy::constant(Duration::from_secs(2), 1);
        let start = Instant::now();
        let mut backoff = Backoff::new(&policy, Budget::Deadline(start + Duration::from_secs(5)));

        assert!(backoff.wait().await); // t = 2
        assert!(backoff.wait().await); // t = 4
        assert!(!backoff.wait().await); // would pass t = 5
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(backoff.failures(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_delay_against_deadline_stops_at_deadline() {
        let policy = RetryPolicy::constant(Duration::MAX, 1);
        let start = Instant::now();
        let mut backoff = Backoff::new(&policy, Budget::Deadline(start + Duration::from_secs(3)));

        assert!(!backoff.wait().await);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}
