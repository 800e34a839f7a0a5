//! skiff.toml configuration.
//!
//! Every section is optional. Durations are strings such as `"5s"`,
//! `"500ms"` or `"2m"`. Environment variables set by the cluster (or by
//! the deployer when it launches the broker) override file values.

use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::{PolicyError, RetryPolicy};
use crate::types::EndpointType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: String, value: String },

    #[error("invalid retry policy for {field}: {source}")]
    InvalidPolicy {
        field: String,
        #[source]
        source: PolicyError,
    },

    #[error("local deployments require a local cluster ip")]
    MissingClusterIp,

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Where the cluster runs, which decides how public endpoints are exposed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeploymentType {
    #[default]
    Local,
    Aws,
    Gce,
    Other(String),
}

impl DeploymentType {
    pub fn as_str(&self) -> &str {
        match self {
            DeploymentType::Local => "local",
            DeploymentType::Aws => "aws",
            DeploymentType::Gce => "gce",
            DeploymentType::Other(s) => s,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, DeploymentType::Local)
    }

    /// Local clusters expose on node ports; everything else gets a load balancer.
    pub fn public_endpoint_type(&self) -> EndpointType {
        if self.is_local() {
            EndpointType::NodeExposed
        } else {
            EndpointType::LoadBalanced
        }
    }
}

impl From<String> for DeploymentType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "local" => DeploymentType::Local,
            "aws" => DeploymentType::Aws,
            "gce" => DeploymentType::Gce,
            _ => DeploymentType::Other(s),
        }
    }
}

impl From<DeploymentType> for String {
    fn from(t: DeploymentType) -> Self {
        t.as_str().to_string()
    }
}

impl FromStr for DeploymentType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DeploymentType::from(s.to_string()))
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkiffConfig {
    pub cluster: ClusterConfig,
    pub rollout: RolloutSection,
    pub relay: RelaySection,
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub url: String,
    pub namespace: String,
    pub deployment_type: DeploymentType,
    pub local_cluster_ip: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    /// Service account token file, read when `token` is unset.
    pub token_file: Option<PathBuf>,
    /// Use the pod's service account and mounted CA instead of `url`.
    pub in_cluster: bool,
    pub insecure_skip_tls_verify: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            namespace: "ocopea".to_string(),
            deployment_type: DeploymentType::Local,
            local_cluster_ip: None,
            username: None,
            password: None,
            token: None,
            token_file: None,
            in_cluster: false,
            insecure_skip_tls_verify: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub max_retries: u32,
    pub interval: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutSection {
    pub replicas: Option<PolicyConfig>,
    pub pod_scheduled: Option<PolicyConfig>,
    pub pod_running: Option<PolicyConfig>,
    pub service_ready: Option<PolicyConfig>,
    pub namespace_termination: Option<PolicyConfig>,
    pub service_state: Option<PolicyConfig>,
    pub cluster_local_grace: Option<String>,
    pub running_settle: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    pub capacity: Option<usize>,
    pub open_retry: Option<String>,
    pub discovery_interval: Option<String>,
    pub rediscover_interval: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub port: u16,
    /// `host:port` the broker is reachable at from inside the cluster.
    pub in_cluster_address: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            in_cluster_address: None,
        }
    }
}

impl SkiffConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let (Some(host), Some(port)) =
            (get("KUBERNETES_SERVICE_HOST"), get("KUBERNETES_SERVICE_PORT"))
        {
            self.cluster.url = format!("https://{host}:{port}");
            self.cluster.in_cluster = true;
        }
        if let Some(ip) = get("LOCAL_CLUSTER_IP") {
            self.cluster.local_cluster_ip = Some(ip);
        }
        if let Some(kind) = get("NAZ_DEPLOYMENT_TYPE") {
            self.cluster.deployment_type = DeploymentType::from(kind);
        }
        if let Some(user) = get("K8S_USERNAME") {
            self.cluster.username = Some(user);
        }
        if let Some(password) = get("K8S_PASSWORD") {
            self.cluster.password = Some(password);
        }
        if let Some(ns) = get("NAZ_NAMESPACE") {
            self.cluster.namespace = ns;
        }
        if let (Some(host), Some(port)) = (get("K8SPSB_SERVICE_HOST"), get("K8SPSB_SERVICE_PORT"))
        {
            self.broker.in_cluster_address = Some(format!("{host}:{port}"));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.deployment_type.is_local()
            && self
                .cluster
                .local_cluster_ip
                .as_deref()
                .is_none_or(str::is_empty)
        {
            return Err(ConfigError::MissingClusterIp);
        }
        if self.relay.capacity == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "relay.capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Parse a duration string: `"5s"`, `"500ms"`, `"2m"`, or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Resolve an optional duration field, falling back to `default`.
pub fn duration_or(
    field: &str,
    value: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => parse_duration(raw).ok_or_else(|| ConfigError::InvalidDuration {
            field: field.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Resolve an optional policy field, falling back to `default`.
pub fn policy_or(
    field: &str,
    value: Option<&PolicyConfig>,
    default: RetryPolicy,
) -> Result<RetryPolicy, ConfigError> {
    let Some(cfg) = value else {
        return Ok(default);
    };
    let interval = duration_or(field, Some(&cfg.interval), default.interval())?;
    RetryPolicy::new(cfg.max_retries, interval).map_err(|source| ConfigError::InvalidPolicy {
        field: field.to_string(),
        source,
    })
}
