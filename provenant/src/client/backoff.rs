//! Exponential backoff with jitter for transient remote failures.

use crate::config::{Jitter, RetryConfig};
use rand::Rng;
use std::time::Duration;

/// Computes the wait before the next attempt.
///
/// `attempt` is the number of attempts already made (1 for the first retry).
/// A server-specified wait, from a `Retry-After` header, overrides the
/// computed backoff entirely.
#[must_use]
pub fn delay_for(config: &RetryConfig, attempt: u32, server_wait: Option<Duration>) -> Duration {
    if let Some(wait) = server_wait {
        return wait;
    }

    let exponent = attempt.saturating_sub(1);
    let raw = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(exponent));
    let capped = raw.min(config.max_delay_ms);

    let jittered = match config.jitter {
        Jitter::None => capped,
        Jitter::Full => {
            if capped == 0 {
                0
            } else {
                rand::thread_rng().gen_range(0..=capped)
            }
        }
        Jitter::Equal => {
            let half = capped / 2;
            if half == 0 {
                capped
            } else {
                half + rand::thread_rng().gen_range(0..=half)
            }
        }
    };

    Duration::from_millis(jittered)
}
