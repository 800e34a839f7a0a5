//! Rollout timing configuration.

use std::time::Duration;

use skiff_core::{ConfigError, RetryPolicy, RolloutSection, duration_or, policy_or};

/// Retry budgets for each wait, plus the two fixed delays.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutConfig {
    pub replicas: RetryPolicy,
    pub pod_scheduled: RetryPolicy,
    pub pod_running: RetryPolicy,
    pub service_ready: RetryPolicy,
    pub namespace_termination: RetryPolicy,
    /// Hosted-service state checks made by the deployment pipeline.
    pub service_state: RetryPolicy,
    /// Delay after which a cluster-local service is assumed ready.
    pub cluster_local_grace: Duration,
    /// Pause after a pod first reports `Running`.
    pub running_settle: Duration,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            replicas: RetryPolicy::REPLICAS,
            pod_scheduled: RetryPolicy::POD_SCHEDULED,
            pod_running: RetryPolicy::POD_RUNNING,
            service_ready: RetryPolicy::SERVICE_READY,
            namespace_termination: RetryPolicy::NAMESPACE_TERMINATION,
            service_state: RetryPolicy::SERVICE_STATE,
            cluster_local_grace: Duration::from_secs(5),
            running_settle: Duration::from_secs(3),
        }
    }
}

impl RolloutConfig {
    pub fn from_section(section: &RolloutSection) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            replicas: policy_or("rollout.replicas", section.replicas.as_ref(), d.replicas)?,
            pod_scheduled: policy_or(
                "rollout.pod_scheduled",
                section.pod_scheduled.as_ref(),
                d.pod_scheduled,
            )?,
            pod_running: policy_or(
                "rollout.pod_running",
                section.pod_running.as_ref(),
                d.pod_running,
            )?,
            service_ready: policy_or(
                "rollout.service_ready",
                section.service_ready.as_ref(),
                d.service_ready,
            )?,
            namespace_termination: policy_or(
                "rollout.namespace_termination",
                section.namespace_termination.as_ref(),
                d.namespace_termination,
            )?,
            service_state: policy_or(
                "rollout.service_state",
                section.service_state.as_ref(),
                d.service_state,
            )?,
            cluster_local_grace: duration_or(
                "rollout.cluster_local_grace",
                section.cluster_local_grace.as_deref(),
                d.cluster_local_grace,
            )?,
            running_settle: duration_or(
                "rollout.running_settle",
                section.running_settle.as_deref(),
                d.running_settle,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use skiff_core::PolicyConfig;

    use super::*;

    #[test]
    fn empty_section_keeps_defaults() {
        let config = RolloutConfig::from_section(&RolloutSection::default()).unwrap();
        assert_eq!(config, RolloutConfig::default());
        assert_eq!(config.pod_running.max_retries(), 900);
        assert_eq!(config.cluster_local_grace, Duration::from_secs(5));
    }

    #[test]
    fn section_overrides() {
        let section = RolloutSection {
            service_ready: Some(PolicyConfig {
                max_retries: 5,
                interval: "100ms".to_string(),
            }),
            running_settle: Some("0".to_string()),
            ..Default::default()
        };
        let config = RolloutConfig::from_section(&section).unwrap();
        assert_eq!(config.service_ready.max_retries(), 5);
        assert_eq!(config.service_ready.interval(), Duration::from_millis(100));
        assert_eq!(config.running_settle, Duration::ZERO);
    }
}
