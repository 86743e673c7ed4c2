//! Token-bucket rate limiting.

use crate::cancellation::{sleep_cancellable, CancellationToken};
use crate::config::RateLimitConfig;
use crate::errors::Result;
use parking_lot::Mutex;
use rand::Rng;
use std::time::{Duration, Instant};

/// Upper bound on one cooperative wait slice; the bucket is re-checked after
/// each slice so refill jitter keeps callers from waking in lockstep.
const MAX_WAIT_SLICE: Duration = Duration::from_secs(5);

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket serializing call admission for one logical endpoint.
///
/// Callers block cooperatively until a token is available. Refill carries
/// randomized jitter of ±20% so concurrent callers against the same endpoint
/// do not synchronize into a thundering herd. The lock is never held across
/// a suspension point.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket from the endpoint's rate settings.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            capacity: config.capacity.max(1.0),
            refill_per_sec: config.refill_per_sec.max(0.0),
            state: Mutex::new(BucketState {
                tokens: config.capacity.max(1.0),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Acquires one token, waiting cooperatively if none is available.
    ///
    /// Returns the total time spent waiting, for throttle reporting. The
    /// wait races against the run's cancellation token.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Duration> {
        let start = Instant::now();
        loop {
            let wait = {
                let mut state = self.state.lock();
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill);
                let jitter = rand::thread_rng().gen_range(0.8..=1.2);
                state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_per_sec * jitter)
                    .min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else if self.refill_per_sec > 0.0 {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                } else {
                    Some(MAX_WAIT_SLICE)
                }
            };

            match wait {
                None => return Ok(start.elapsed()),
                Some(d) => {
                    sleep_cancellable(d.clamp(Duration::from_millis(1), MAX_WAIT_SLICE), cancel)
                        .await?;
                }
            }
        }
    }

    /// Current token count, for tests and diagnostics.
    #[must_use]
    pub fn tokens_available(&self) -> f64 {
        self.state.lock().tokens
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("refill_per_sec", &self.refill_per_sec)
            .field("tokens_available", &self.tokens_available())
            .finish()
    }
}
