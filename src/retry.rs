//! Bounded retry with a constant delay between attempts.
//!
//! Attempts are strictly sequential. The first success wins immediately;
//! after the last failed attempt only that attempt's error is surfaced.

use std::future::Future;
use std::time::Duration;

use crate::error::{HeartwatchError, Result};

/// How many times to try an operation and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

/// All attempts failed; carries the error of the final attempt.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` must be at least 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(HeartwatchError::Config("retry max_attempts must be at least 1".to_string()));
        }
        Ok(Self { max_attempts, delay })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// No delay follows a success, and none follows the final failure.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> std::result::Result<T, Exhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(attempts = attempt, error = %e, "Retries exhausted");
                    return Err(Exhausted { attempts: attempt, last: e });
                }
            }
        }
    }
}

impl From<Exhausted<HeartwatchError>> for HeartwatchError {
    fn from(exhausted: Exhausted<HeartwatchError>) -> Self {
        HeartwatchError::RetryExhausted {
            attempts: exhausted.attempts,
            last: Box::new(exhausted.last),
        }
    }
}
