//! Bounded retry for outbound calls and database writes.

use std::fmt::Display;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Delay doubles after every failed attempt.
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            backoff: Backoff::Exponential,
        }
    }

    /// No retries at all.
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based count of failures so far).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => self.delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1))),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

/// Run `op` until it succeeds or the policy's attempts are spent, returning
/// the last error.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} attempt {}/{} failed: {}. Retrying in {:?}",
                    label, attempt, attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// What a fetch does once its retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailurePolicy {
    /// Propagate the error and fail the run.
    Abort,
    /// Log the error and carry on with no records.
    Empty,
}

impl FromStr for FetchFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(FetchFailurePolicy::Abort),
            "empty" => Ok(FetchFailurePolicy::Empty),
            other => Err(format!("unknown fetch failure policy `{other}` (expected abort or empty)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_delay_for() {
        let fixed = RetryPolicy::fixed(3, Duration::from_secs(5));
        assert_eq!(fixed.delay_for(1), Duration::from_secs(5));
        assert_eq!(fixed.delay_for(2), Duration::from_secs(5));

        let exp = RetryPolicy::exponential(5, Duration::from_secs(2));
        assert_eq!(exp.delay_for(1), Duration::from_secs(2));
        assert_eq!(exp.delay_for(2), Duration::from_secs(4));
        assert_eq!(exp.delay_for(4), Duration::from_secs(16));
        // Connection retries are configurable without an upper bound.
        assert!(exp.delay_for(100) >= exp.delay_for(40));
        assert!(exp.delay_for(u32::MAX) > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let result: Result<u32, String> = with_retry(&policy, "flaky", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(format!("failure {n}"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::fixed(2, Duration::ZERO);

        let result: Result<(), &str> = with_retry(&policy, "down", || {
            calls.set(calls.get() + 1);
            async { Err("unavailable") }
        })
        .await;

        assert_eq!(result, Err("unavailable"));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::fixed(0, Duration::ZERO);
        let result: Result<(), &str> = tokio_test::block_on(with_retry(&policy, "once", || {
            calls.set(calls.get() + 1);
            async { Err("nope") }
        }));
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_fetch_failure_policy_from_str() {
        assert_eq!("Abort".parse(), Ok(FetchFailurePolicy::Abort));
        assert_eq!(" empty ".parse(), Ok(FetchFailurePolicy::Empty));
        assert!("ignore".parse::<FetchFailurePolicy>().is_err());
    }
}
