use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{RetryError, ScrapeError};

/// Bounded-retry policy: attempt `max_attempts` times, sleeping
/// `base_delay * 2^attempt` between transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Run `op` under `policy`. Transient failures are retried with exponential
/// backoff; permanent failures propagate immediately with the attempt count
/// so far. No state is shared between calls.
pub async fn run<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last: Option<ScrapeError> = None;

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} failed (attempt {}/{}), backing off {:.1}s: {}",
                    label,
                    attempt + 1,
                    attempts,
                    delay.as_secs_f64(),
                    e
                );
                tokio::time::sleep(delay).await;
                last = Some(e);
            }
            Err(e) if e.is_transient() => {
                return Err(RetryError {
                    attempts,
                    last: e,
                });
            }
            Err(e) => {
                // Permanent: no point retrying.
                return Err(RetryError {
                    attempts: attempt + 1,
                    last: e,
                });
            }
        }
    }

    // Unreachable unless attempts == 0 was clamped; keep the aggregate shape.
    Err(RetryError {
        attempts,
        last: last.unwrap_or(ScrapeError::LocatorNotFound { intent: "retry" }),
    })
}
