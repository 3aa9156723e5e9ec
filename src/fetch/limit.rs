//! Aggregate byte-rate limiting shared by all workers of a batch.

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Token bucket measured in bytes.
pub struct ByteLimiter {
    limiter: DefaultDirectRateLimiter,
    burst: NonZeroU32,
}

impl ByteLimiter {
    /// Allows `bytes_per_sec` on average, with bursts of at least one chunk.
    #[must_use]
    pub fn new(bytes_per_sec: NonZeroU32, chunk_size: usize) -> Self {
        let chunk = NonZeroU32::new(u32::try_from(chunk_size).unwrap_or(u32::MAX))
            .unwrap_or(NonZeroU32::MIN);
        let burst = bytes_per_sec.max(chunk);
        let quota = Quota::per_second(bytes_per_sec).allow_burst(burst);
        Self {
            limiter: RateLimiter::direct(quota),
            burst,
        }
    }

    /// Waits until `bytes` may be written.
    pub async fn consume(&self, bytes: usize) {
        let mut remaining = u64::try_from(bytes).unwrap_or(u64::MAX);
        while remaining > 0 {
            let step = remaining.min(u64::from(self.burst.get()));
            let Some(n) = u32::try_from(step).ok().and_then(NonZeroU32::new) else {
                break;
            };
            if self.limiter.until_n_ready(n).await.is_err() {
                // Cannot happen: `step` never exceeds the burst size.
                break;
            }
            remaining -= step;
        }
    }
}
