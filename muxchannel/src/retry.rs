//! Bounded retry on congestion.
//!
//! Channel operations fail fast when the outbound sink is full. These
//! helpers sit on top of that contract for callers that prefer to wait a
//! little: they retry only on [`Error::TransportCongested`], with an
//! exponential backoff capped at [`RetryPolicy::max_delay`], and give up
//! after [`RetryPolicy::max_attempts`].

use std::time::Duration;

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::sink::OutboundSink;

/// Retry schedule for congested enqueues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each failure (e.g., 2 for doubling).
    pub backoff_factor: u32,
}

impl RetryPolicy {
    /// Creates a new retry policy.
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, backoff_factor: u32) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            backoff_factor,
        }
    }

    /// A policy that never retries; equivalent to calling the channel directly.
    pub const fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1)
    }

    /// Returns the delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_factor
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        core::cmp::min(self.base_delay.saturating_mul(factor), self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with something other than
    /// congestion, or the attempts are used up.
    pub async fn run<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Err(Error::TransportCongested) if attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    log::debug!("Outbound sink congested, retry {} in {:?}", attempt, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(10), Duration::from_millis(500), 2)
    }
}

/// Announces the channel, retrying while the sink is congested.
pub async fn open_with_retry<S: OutboundSink>(channel: &Channel<S>, policy: &RetryPolicy) -> Result<()> {
    policy.run(|| channel.open()).await
}

/// Writes a payload, retrying while the sink is congested.
pub async fn write_with_retry<S: OutboundSink>(
    channel: &Channel<S>,
    data: &[u8],
    policy: &RetryPolicy,
) -> Result<()> {
    policy.run(|| channel.write(data)).await
}

/// Closes the channel, retrying while the sink is congested.
pub async fn close_with_retry<S: OutboundSink>(channel: &Channel<S>, policy: &RetryPolicy) -> Result<()> {
    policy.run(|| channel.close()).await
}
