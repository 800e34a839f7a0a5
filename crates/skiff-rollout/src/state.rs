//! Rollout state machine.
//!
//! States only move forward, or into one of the two terminal failures.
//! Nothing is ever revisited.

use std::fmt;
use std::time::Instant;

use tracing::{info, warn};

use crate::error::RolloutError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutState {
    Submitted,
    ScheduledWithReplica,
    PodScheduled,
    PodRunning,
    ServiceReady,
    Failed(String),
    TimedOut,
}

impl RolloutState {
    /// Position along the happy path. Terminal failures have none.
    fn rank(&self) -> Option<u8> {
        match self {
            RolloutState::Submitted => Some(0),
            RolloutState::ScheduledWithReplica => Some(1),
            RolloutState::PodScheduled => Some(2),
            RolloutState::PodRunning => Some(3),
            RolloutState::ServiceReady => Some(4),
            RolloutState::Failed(_) | RolloutState::TimedOut => None,
        }
    }

    pub fn is_terminal_failure(&self) -> bool {
        self.rank().is_none()
    }
}

impl fmt::Display for RolloutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloutState::Submitted => f.write_str("submitted"),
            RolloutState::ScheduledWithReplica => f.write_str("scheduled-with-replica"),
            RolloutState::PodScheduled => f.write_str("pod-scheduled"),
            RolloutState::PodRunning => f.write_str("pod-running"),
            RolloutState::ServiceReady => f.write_str("service-ready"),
            RolloutState::Failed(reason) => write!(f, "failed: {reason}"),
            RolloutState::TimedOut => f.write_str("timed-out"),
        }
    }
}

/// Tracks one workload's rollout.
#[derive(Debug, Clone)]
pub struct Rollout {
    workload: String,
    state: RolloutState,
    started_at: Instant,
}

impl Rollout {
    pub fn new(workload: &str) -> Self {
        Self {
            workload: workload.to_string(),
            state: RolloutState::Submitted,
            started_at: Instant::now(),
        }
    }

    pub fn workload(&self) -> &str {
        &self.workload
    }

    pub fn state(&self) -> &RolloutState {
        &self.state
    }

    /// Move forward to `next`. Backward moves and moves out of a terminal
    /// failure are refused and logged.
    pub fn advance(&mut self, next: RolloutState) -> bool {
        let allowed = match (self.state.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !allowed {
            warn!(
                workload = %self.workload,
                from = %self.state,
                to = %next,
                "refusing rollout state transition"
            );
            return false;
        }
        info!(
            workload = %self.workload,
            from = %self.state,
            to = %next,
            elapsed_ms = self.started_at.elapsed().as_millis() as u64,
            "rollout advanced"
        );
        self.state = next;
        true
    }

    /// Record the terminal outcome of a failed step.
    pub fn fail_with(&mut self, error: &RolloutError) {
        let next = if error.is_timeout() {
            RolloutState::TimedOut
        } else {
            RolloutState::Failed(error.to_string())
        };
        self.advance(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_only() {
        let mut rollout = Rollout::new("echo");
        assert!(rollout.advance(RolloutState::ScheduledWithReplica));
        assert!(rollout.advance(RolloutState::PodRunning));
        assert!(!rollout.advance(RolloutState::PodScheduled));
        assert!(!rollout.advance(RolloutState::PodRunning));
        assert_eq!(rollout.state(), &RolloutState::PodRunning);
    }

    #[test]
    fn terminal_failure_is_final() {
        let mut rollout = Rollout::new("echo");
        rollout.fail_with(&RolloutError::ServiceNotReady("echo".into(), 3));
        assert_eq!(rollout.state(), &RolloutState::TimedOut);
        assert!(!rollout.advance(RolloutState::ServiceReady));
        assert!(!rollout.advance(RolloutState::Failed("later".into())));
    }

    #[test]
    fn observed_fault_is_failed() {
        let mut rollout = Rollout::new("echo");
        rollout.fail_with(&RolloutError::Terminated {
            pod: "echo-1".into(),
            detail: "exit code 1".into(),
        });
        assert!(matches!(rollout.state(), RolloutState::Failed(_)));
        assert!(rollout.state().is_terminal_failure());
    }
}
