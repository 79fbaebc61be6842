//! Delivery attempts with exponential backoff.
//!
//! The [`Dispatcher`](crate::Dispatcher) wraps every duplex transport call
//! in [`retry_with_backoff`]. Only [`QueueError::Connection`](crate::QueueError::Connection) failures are
//! retried, since those are the only ones where the request provably never
//! reached the server. A timeout or a decode failure may follow a delivered
//! request, and resending could enqueue the same item twice.
//!
//! # Backoff
//!
//! - first retry waits `initial_delay`
//! - each later retry waits `min(previous * multiplier, max_delay)`
//! - every wait is jittered by ±25 %

use std::collections::hash_map::RandomState;
use std::future::Future;
use std::hash::BuildHasher;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::{log_debug, ChannelSettings};

/// Upper bound on a single backoff wait.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Attempt budget and backoff curve for one dispatched call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Never below 1.
    pub max_attempts: u8,

    /// Delay growth applied after each failed attempt.
    pub multiplier: f32,

    /// Wait before the second attempt.
    pub initial_delay: Duration,

    /// Cap on any single wait.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Derive the policy from a channel: `max_retry` attempts, starting at
    /// `wait_interval` and doubling up to [`MAX_BACKOFF`].
    pub fn from_settings(settings: &ChannelSettings) -> Self {
        Self {
            max_attempts: settings.max_retry(),
            multiplier: 2.0,
            initial_delay: settings.wait_interval(),
            max_delay: MAX_BACKOFF,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            multiplier: 2.0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt budget is spent.
///
/// `operation` receives the 1-based attempt number so the caller can stamp
/// it on the outgoing envelope. The last error is returned when every
/// attempt fails.
///
/// With a `deadline`, no backoff sleep or further attempt is started that
/// would end past it; the last error is returned instead.
pub(crate) async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    deadline: Option<Instant>,
    mut operation: F,
) -> crate::Result<T>
where
    F: FnMut(u8) -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u8 = 1;
    let mut current_delay = policy.initial_delay;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let jittered_delay = apply_jitter(current_delay);

                if let Some(deadline) = deadline {
                    if Instant::now() + jittered_delay >= deadline {
                        log_debug!("attempt {attempt} failed ({err}), no time left to retry");
                        return Err(err);
                    }
                }

                log_debug!(
                    "attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    max_attempts,
                    err,
                    jittered_delay
                );

                sleep(jittered_delay).await;

                let next_delay =
                    Duration::from_secs_f64(current_delay.as_secs_f64() * policy.multiplier as f64);
                current_delay = next_delay.min(policy.max_delay);
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() && max_attempts > 1 {
                    log_debug!("retry exhausted after {} attempts: {}", max_attempts, err);
                }
                return Err(err);
            }
        }
    }
}

/// Apply ±25% jitter: `delay * (0.75 + random(0.0..0.5))`.
fn apply_jitter(delay: Duration) -> Duration {
    // ---
    if delay.is_zero() {
        return delay;
    }

    let random_state = RandomState::new();
    let hash = random_state.hash_one(std::time::SystemTime::now());
    let random_factor = (hash % 1000) as f64 / 1000.0;
    let jitter_multiplier = 0.75 + (random_factor * 0.5);

    Duration::from_secs_f64(delay.as_secs_f64() * jitter_multiplier)
}
