//! Retry policy for collaborator calls.
//!
//! Sleeping goes through the [`Sleeper`] trait so tests can swap the Tokio
//! timer for a recording fake and check the exact backoff sequence without
//! waiting for it.
//!
//! With the defaults (3 attempts, 1 s base) a permanently failing call costs
//! two sleeps: 1 s after the first failure, 2 s after the second.

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Source of delays between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real clock: `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded attempts with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one. Always ≥ 1.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after each further failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait after `failed_attempt` (1-indexed) failed.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-indexed attempt number. On exhaustion the last
    /// error is returned; deciding what to do with it is the caller's job.
    pub async fn run<T, E, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        what: &str,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max => {
                    warn!(attempt, max, "{what}: giving up: {e}");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        attempt,
                        max,
                        delay_ms = delay.as_millis() as u64,
                        "{what}: attempt failed: {e}"
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
