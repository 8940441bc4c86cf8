//! Bounded retries with per-call-site delay policies.
//!
//! Every I/O stage of a run (page fetch, post listing, generation, publish)
//! goes through a [`RetryPolicy`]. The policy is a value handed to the call
//! site, so each stage can carry its own attempt budget and delay.
//!
//! ```rust,ignore
//! let policy = RetryPolicy::linear(3, Duration::from_secs(15));
//! let reply = policy.retry("generate", |_attempt| generator.generate(&request)).await?;
//! ```

use backoff::backoff::{Backoff, Constant};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Delay before the next attempt grows by `base` after every failure:
/// `base`, `2 * base`, `3 * base`, ...
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
    failures: u32,
}

impl LinearBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base, failures: 0 }
    }
}

impl Backoff for LinearBackoff {
    fn reset(&mut self) {
        self.failures = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        Some(self.base.saturating_mul(self.failures))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDelay {
    /// Same pause after every failed attempt
    Fixed(Duration),
    /// `base * attempt` after failed attempt `attempt`
    Linear(Duration),
}

impl RetryDelay {
    fn backoff(&self) -> Box<dyn Backoff + Send> {
        match *self {
            RetryDelay::Fixed(delay) => Box::new(Constant::new(delay)),
            RetryDelay::Linear(base) => Box::new(LinearBackoff::new(base)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: RetryDelay,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay: RetryDelay::Fixed(delay),
        }
    }

    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            delay: RetryDelay::Linear(base_delay),
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// The pauses a fully failing run would take, in order.
    pub fn delays(&self) -> Vec<Duration> {
        let mut backoff = self.delay.backoff();
        (1..self.max_attempts.max(1))
            .filter_map(|_| backoff.next_backoff())
            .collect()
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned
    /// when every attempt failed.
    pub async fn retry<F, Fut, T, E>(&self, stage: &str, op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.retry_if(stage, op, |_| true).await
    }

    /// Like [`RetryPolicy::retry`], but gives up at once on errors `should_retry` rejects.
    pub async fn retry_if<F, Fut, T, E, P>(&self, stage: &str, mut op: F, mut should_retry: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: FnMut(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = self.delay.backoff();
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let attempt_started = Instant::now();
            debug!(stage = stage, attempt = attempt, max_attempts = max_attempts, "attempt starting");

            let error = match op(attempt).await {
                Ok(value) => {
                    info!(
                        stage = stage,
                        attempt = attempt,
                        elapsed_ms = attempt_started.elapsed().as_millis() as u64,
                        "attempt succeeded"
                    );
                    return Ok(value);
                }
                Err(error) => error,
            };

            warn!(
                stage = stage,
                attempt = attempt,
                max_attempts = max_attempts,
                elapsed_ms = attempt_started.elapsed().as_millis() as u64,
                error = %error,
                "attempt failed"
            );

            if !should_retry(&error) {
                warn!(stage = stage, attempt = attempt, "error is not retryable, giving up");
                return Err(error);
            }

            if attempt >= max_attempts {
                error!(
                    stage = stage,
                    attempts = attempt,
                    total_elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %error,
                    "all attempts exhausted"
                );
                return Err(error);
            }

            let Some(delay) = backoff.next_backoff() else {
                return Err(error);
            };
            info!(
                stage = stage,
                next_attempt = attempt + 1,
                delay_secs = delay.as_secs_f64(),
                "retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
