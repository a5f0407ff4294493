//! Randomized exponential backoff around a fallible async step.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::constants::{
    RETRY_EXHAUSTED_COOLDOWN, RETRY_MAX_ATTEMPTS, RETRY_MAX_WAIT, RETRY_MIN_WAIT,
};
use crate::error::BatchError;

/// How often and how patiently to retry an item.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Lower bound for every backoff
    pub min_wait: Duration,
    /// Upper bound for every backoff
    pub max_wait: Duration,
    /// Scale of the exponential term, `multiplier * 2^(attempt - 1)`
    pub multiplier: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause taken after the last attempt fails
    pub exhausted_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_wait: RETRY_MIN_WAIT,
            max_wait: RETRY_MAX_WAIT,
            multiplier: Duration::from_secs(1),
            max_attempts: RETRY_MAX_ATTEMPTS,
            exhausted_cooldown: RETRY_EXHAUSTED_COOLDOWN,
        }
    }
}

/// Result of running a step under a [`RetryPolicy`].
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// One of the attempts succeeded
    Completed(T),
    /// Every attempt failed
    Exhausted {
        /// How many attempts were made
        attempts: u32,
        /// The error from the final attempt
        last_error: BatchError,
    },
}

enum State {
    Attempting(u32),
    BackoffWait {
        attempt: u32,
        delay: Duration,
        error: BatchError,
    },
    GiveUp {
        attempts: u32,
        error: BatchError,
    },
}

impl RetryPolicy {
    /// Upper end of the random window for `attempt` (1-based).
    fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let raw = self.multiplier.saturating_mul(1u32 << exponent);
        raw.clamp(self.min_wait, self.max_wait.max(self.min_wait))
    }

    /// Backoff for `attempt` given a uniform sample in `[0, 1)`.
    pub fn backoff_with(&self, attempt: u32, sample: f64) -> Duration {
        let ceiling = self.ceiling(attempt);
        let spread = ceiling.saturating_sub(self.min_wait);
        self.min_wait + spread.mul_f64(sample.clamp(0.0, 1.0))
    }

    /// Random backoff after a failed `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_with(attempt, rand::random::<f64>())
    }

    /// Runs `step` until it succeeds or `max_attempts` is reached.
    ///
    /// `step` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut step: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, BatchError>>,
    {
        let mut state = State::Attempting(1);
        loop {
            state = match state {
                State::Attempting(attempt) => match step(attempt).await {
                    Ok(value) => return RetryOutcome::Completed(value),
                    Err(error) if attempt >= self.max_attempts => State::GiveUp {
                        attempts: attempt,
                        error,
                    },
                    Err(error) => State::BackoffWait {
                        attempt,
                        delay: self.backoff(attempt),
                        error,
                    },
                },
                State::BackoffWait {
                    attempt,
                    delay,
                    error,
                } => {
                    info!(
                        "{label}: attempt {attempt}/{} failed ({error}), retrying in {:.1}s",
                        self.max_attempts,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    State::Attempting(attempt + 1)
                }
                State::GiveUp { attempts, error } => {
                    warn!("{label}: giving up after {attempts} attempts: {error}");
                    return RetryOutcome::Exhausted {
                        attempts,
                        last_error: error,
                    };
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn default_backoff_stays_in_window() {
        let policy = RetryPolicy::default();
        for attempt in 1..=policy.max_attempts {
            for sample in [0.0, 0.25, 0.5, 0.999] {
                let delay = policy.backoff_with(attempt, sample);
                assert!(delay >= Duration::from_secs(60), "{delay:?}");
                assert!(delay <= Duration::from_secs(125), "{delay:?}");
            }
            let delay = policy.backoff(attempt);
            assert!(delay >= policy.min_wait && delay <= policy.max_wait);
        }
    }

    #[test]
    fn ceiling_grows_until_capped() {
        let policy = RetryPolicy {
            min_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(policy.ceiling(1), Duration::from_secs(1));
        assert_eq!(policy.ceiling(2), Duration::from_secs(2));
        assert_eq!(policy.ceiling(4), Duration::from_secs(8));
        assert_eq!(policy.ceiling(5), Duration::from_secs(10));
        assert_eq!(policy.ceiling(40), Duration::from_secs(10));
        assert_eq!(policy.backoff_with(4, 0.5), Duration::from_millis(4500));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let outcome = policy
            .run("item 1", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(BatchError::Response("flaky".to_string()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert!(matches!(outcome, RetryOutcome::Completed(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let outcome: RetryOutcome<()> = policy
            .run("item 2", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BatchError::RateLimited("chat completions")) }
            })
            .await;
        match outcome {
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 5);
                assert!(matches!(last_error, BatchError::RateLimited(_)));
            }
            RetryOutcome::Completed(()) => panic!("should not succeed"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // four backoffs of at least a minute each
        assert!(started.elapsed() >= Duration::from_secs(240));
    }
}
