//! Bounded polling.
//!
//! A wait makes at most `max_retries` attempts and sleeps only between
//! them, so its worst case is `(max_retries - 1) * interval` of sleep plus
//! one round trip per attempt.

use std::fmt::Display;
use std::future::Future;

use skiff_core::RetryPolicy;
use tracing::debug;

use crate::error::{ErrorClass, RolloutError};

/// Errors that a polling loop knows how to classify.
pub trait Retryable: Display {
    fn is_transient(&self) -> bool;
}

impl Retryable for RolloutError {
    fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Numbered attempts under a policy.
#[derive(Debug)]
pub struct Attempts {
    policy: RetryPolicy,
    made: u32,
}

impl Attempts {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, made: 0 }
    }

    /// Start the next attempt, sleeping first unless it is the first one.
    /// Returns its 1-based number, or `None` once the budget is spent.
    pub async fn next(&mut self) -> Option<u32> {
        if self.made >= self.policy.max_retries() {
            return None;
        }
        if self.made > 0 {
            tokio::time::sleep(self.policy.interval()).await;
        }
        self.made += 1;
        Some(self.made)
    }

    pub fn made(&self) -> u32 {
        self.made
    }

    pub fn max(&self) -> u32 {
        self.policy.max_retries()
    }
}

/// Run `check` until it yields a value or fails terminally. An exhausted
/// policy gives `Ok(None)`. Transient failures count as a "not yet".
pub async fn poll_until<T, E, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut check: F,
) -> Result<Option<T>, E>
where
    E: Retryable,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let mut attempts = Attempts::new(policy);
    while let Some(attempt) = attempts.next().await {
        match check(attempt).await {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => {
                debug!(what, attempt, max = attempts.max(), "not ready yet");
            }
            Err(e) if e.is_transient() => {
                debug!(what, attempt, max = attempts.max(), error = %e, "transient failure, retrying");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}
