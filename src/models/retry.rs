use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quadratic backoff policy for failed attempts.
///
/// The delay before attempt `n+1` is `n^2 * base`, where `n` is the retry
/// counter after the failed attempt. With the default one-second base this
/// yields 1s, 4s, 9s, ... between attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Base delay multiplied by the squared retry count.
    #[serde(with = "duration_ms", rename = "base_ms")]
    pub base: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy with the given base delay.
    #[must_use]
    pub const fn new(base: Duration) -> Self {
        Self { base }
    }

    /// Returns the delay to apply after the attempt that left the task at
    /// `retries` failed attempts.
    #[must_use]
    pub fn delay_for(&self, retries: u32) -> Duration {
        let squared = retries.saturating_mul(retries);
        self.base.checked_mul(squared).unwrap_or(Duration::MAX)
    }

    /// Returns the next eligible run time after a failure at `now` that
    /// left the task at `retries` failed attempts.
    #[must_use]
    pub fn schedule_after(&self, now: DateTime<Utc>, retries: u32) -> DateTime<Utc> {
        chrono::Duration::from_std(self.delay_for(retries))
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
