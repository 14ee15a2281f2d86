//! Rate-limited transfer.
//!
//! A single [`RateLimiter`] is shared by every transfer of a session, so the
//! ceiling applies to their aggregate throughput. Pacing uses a token bucket
//! whose burst capacity equals one second worth of bytes; a reservation that
//! overdraws the bucket sleeps until the debt would have been refilled.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use mirror_logging::mirror_trace;
use tokio::time::Instant;

use crate::config::ConfigError;

/// Byte-per-second ceiling parsed from `"<integer><unit>"`, unit one of
/// none, `k`/`K` (x1024) or `m`/`M` (x1024^2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSpec {
    bytes_per_second: u64,
}

impl RateLimitSpec {
    pub fn bytes_per_second(self) -> u64 {
        self.bytes_per_second
    }

    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRateLimit {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let digits_end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (quantity, unit) = trimmed.split_at(digits_end);
        if quantity.is_empty() {
            return Err(invalid("missing numeric quantity"));
        }
        let quantity: u64 = quantity
            .parse()
            .map_err(|_| invalid("quantity out of range"))?;

        let multiplier: u64 = match unit {
            "" => 1,
            "k" | "K" => 1024,
            "m" | "M" => 1024 * 1024,
            _ => return Err(invalid("unrecognized unit")),
        };

        let bytes_per_second = quantity
            .checked_mul(multiplier)
            .ok_or_else(|| invalid("quantity out of range"))?;
        if bytes_per_second == 0 {
            return Err(invalid("rate must be greater than zero"));
        }

        Ok(Self { bytes_per_second })
    }
}

impl FromStr for RateLimitSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RateLimitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} B/s", self.bytes_per_second)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by all concurrent transfers of a session.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(spec: RateLimitSpec) -> Self {
        let rate = spec.bytes_per_second() as f64;
        Self {
            rate,
            capacity: rate,
            bucket: Mutex::new(Bucket {
                tokens: rate,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Reserve `bytes` from the budget, sleeping while the bucket is in debt.
    pub async fn acquire(&self, bytes: usize) {
        let wait = self.reserve(bytes);
        if !wait.is_zero() {
            mirror_trace!("pacing {} bytes for {:?}", bytes, wait);
            tokio::time::sleep(wait).await;
        }
    }

    fn reserve(&self, bytes: usize) -> Duration {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.last_refill = now;
        bucket.tokens -= bytes as f64;
        if bucket.tokens < 0.0 {
            Duration::from_secs_f64(-bucket.tokens / self.rate)
        } else {
            Duration::ZERO
        }
    }
}

/// Pace a byte stream through `limiter`; `None` passes chunks through untouched.
pub fn throttle<S, E>(
    stream: S,
    limiter: Option<Arc<RateLimiter>>,
) -> impl Stream<Item = Result<Bytes, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    stream.then(move |chunk| {
        let limiter = limiter.clone();
        let len = chunk.as_ref().map(Bytes::len).ok();
        async move {
            if let (Some(len), Some(limiter)) = (len, limiter) {
                limiter.acquire(len).await;
            }
            chunk
        }
    })
}
