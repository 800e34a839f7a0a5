//! Relay tuning.

use std::time::Duration;

use skiff_core::{ConfigError, RelaySection, duration_or};

#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Output queue capacity shared by all followers of a session.
    pub capacity: usize,
    /// Delay between attempts to open a pod's log stream.
    pub open_retry: Duration,
    /// Delay between pod listings until the first pod shows up.
    pub discovery_interval: Duration,
    /// When set, keep listing pods at this interval and follow new ones.
    pub rediscover_interval: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            open_retry: Duration::from_secs(1),
            discovery_interval: Duration::from_secs(1),
            rediscover_interval: None,
        }
    }
}

impl RelayConfig {
    pub fn from_section(section: &RelaySection) -> Result<Self, ConfigError> {
        let d = Self::default();
        let capacity = section.capacity.unwrap_or(d.capacity);
        if capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "relay.capacity".into(),
                reason: "must be at least 1".into(),
            });
        }
        let rediscover_interval = match section.rediscover_interval.as_deref() {
            Some(raw) => Some(duration_or(
                "relay.rediscover_interval",
                Some(raw),
                Duration::ZERO,
            )?),
            None => None,
        };
        Ok(Self {
            capacity,
            open_retry: duration_or(
                "relay.open_retry",
                section.open_retry.as_deref(),
                d.open_retry,
            )?,
            discovery_interval: duration_or(
                "relay.discovery_interval",
                section.discovery_interval.as_deref(),
                d.discovery_interval,
            )?,
            rediscover_interval: rediscover_interval.filter(|d| !d.is_zero()),
        })
    }
}
