//! Configuration for download behavior.
//!
//! All knobs have conservative defaults; callers override them through
//! the `with_*` builder methods:
//!
//! ```
//! use blockfetch::config::DownloadConfig;
//!
//! let config = DownloadConfig::default()
//!     .with_block_size(8 * 1024 * 1024)
//!     .with_max_in_flight(8);
//! ```

use std::time::Duration;

/// Default size of one ranged block: 4 MiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Default number of blocks fetched concurrently.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Default number of consecutive transport failures tolerated per stream.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default upper bound on the backoff delay.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponent cap so the backoff shift never overflows.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Retry behavior for a single content stream.
///
/// The retry budget bounds *consecutive* failures: any successful body
/// progress resets the count, so a long transfer over a flaky link is
/// not capped by the budget as long as bytes keep arriving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before giving up.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each consecutive failure.
    pub base_delay: Duration,
    /// Ceiling applied to the computed delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (zero-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Tunable parameters for ranged downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Size of one ranged block in bytes.
    pub block_size: u64,
    /// Number of blocks fetched concurrently.
    pub max_in_flight: usize,
    /// Per-stream retry behavior.
    pub retry: RetryPolicy,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            retry: RetryPolicy::default(),
        }
    }
}

impl DownloadConfig {
    /// Sets the block size in bytes (minimum 1).
    pub fn with_block_size(mut self, bytes: u64) -> Self {
        self.block_size = bytes.max(1);
        self
    }

    /// Sets the number of concurrently fetched blocks (minimum 1).
    pub fn with_max_in_flight(mut self, count: usize) -> Self {
        self.max_in_flight = count.max(1);
        self
    }

    /// Sets the consecutive-failure budget per stream.
    pub fn with_max_retries(mut self, count: u32) -> Self {
        self.retry.max_retries = count;
        self
    }

    /// Sets the delay before the first retry.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
        assert_eq!(config.retry.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_builder_overrides() {
        let config = DownloadConfig::default()
            .with_block_size(1024)
            .with_max_in_flight(16)
            .with_max_retries(5)
            .with_retry_base_delay(Duration::from_millis(10));
        assert_eq!(config.block_size, 1024);
        assert_eq!(config.max_in_flight, 16);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_builder_clamps_to_one() {
        let config = DownloadConfig::default()
            .with_block_size(0)
            .with_max_in_flight(0);
        assert_eq!(config.block_size, 1);
        assert_eq!(config.max_in_flight, 1);
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_respects_ceiling() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(10), DEFAULT_RETRY_MAX_DELAY);
        assert_eq!(policy.delay_for_attempt(u32::MAX), DEFAULT_RETRY_MAX_DELAY);
    }
}
