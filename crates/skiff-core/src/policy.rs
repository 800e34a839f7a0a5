//! Bounded polling policies.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("retry policy needs at least one retry")]
    ZeroRetries,

    #[error("retry policy needs a non-zero interval")]
    ZeroInterval,
}

/// How many times a wait polls and how long it sleeps between polls.
///
/// Both values are strictly positive; a policy cannot be built otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    interval: Duration,
}

impl RetryPolicy {
    /// Replica count observation after submitting a controller.
    pub const REPLICAS: RetryPolicy = RetryPolicy::fixed(60, Duration::from_secs(1));
    /// A pod matching the controller selector appearing.
    pub const POD_SCHEDULED: RetryPolicy = RetryPolicy::fixed(60, Duration::from_secs(1));
    /// A scheduled pod reaching `Running`. Image pulls can be slow.
    pub const POD_RUNNING: RetryPolicy = RetryPolicy::fixed(900, Duration::from_secs(1));
    /// A service endpoint becoming reachable.
    pub const SERVICE_READY: RetryPolicy = RetryPolicy::fixed(100, Duration::from_secs(3));
    /// A deleted namespace vanishing.
    pub const NAMESPACE_TERMINATION: RetryPolicy =
        RetryPolicy::fixed(30, Duration::from_secs(10));
    /// A hosted service reporting `RUNNING` on its state endpoint.
    pub const SERVICE_STATE: RetryPolicy = RetryPolicy::fixed(100, Duration::from_secs(5));

    const fn fixed(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            interval,
        }
    }

    pub fn new(max_retries: u32, interval: Duration) -> Result<Self, PolicyError> {
        if max_retries == 0 {
            return Err(PolicyError::ZeroRetries);
        }
        if interval.is_zero() {
            return Err(PolicyError::ZeroInterval);
        }
        Ok(Self::fixed(max_retries, interval))
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Upper bound on the time spent sleeping across a full wait.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_retries.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_retries() {
        assert_eq!(
            RetryPolicy::new(0, Duration::from_secs(1)),
            Err(PolicyError::ZeroRetries)
        );
    }

    #[test]
    fn rejects_zero_interval() {
        assert_eq!(RetryPolicy::new(3, Duration::ZERO), Err(PolicyError::ZeroInterval));
    }

    #[test]
    fn budget_counts_sleeps_between_attempts() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2)).unwrap();
        assert_eq!(policy.budget(), Duration::from_secs(8));
        assert_eq!(RetryPolicy::POD_RUNNING.max_retries(), 900);
    }
}
