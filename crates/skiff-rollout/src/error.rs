//! Rollout error types and their classification.

use skiff_client::{ClientError, ResourceKind};
use skiff_core::{ConfigError, PodPhase};
use thiserror::Error;

/// How the caller should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth another attempt within the same budget.
    Transient,
    /// Final; never retried.
    Terminal,
    /// Malformed or unexpected data from the cluster. Final.
    Protocol,
}

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("{kind} {name} already exists")]
    NameCollision { kind: ResourceKind, name: String },

    #[error("replication controller {0} failed creating replicas after {1} retries")]
    ReplicasNotCreated(String, u32),

    #[error("no pod scheduled for replication controller {0} after {1} retries")]
    PodNotScheduled(String, u32),

    #[error("pod {pod} failed pulling image {image}: {reason}: {message}")]
    ImagePull {
        pod: String,
        image: String,
        reason: String,
        message: String,
    },

    #[error("pod {pod} container terminated before running: {detail}")]
    Terminated { pod: String, detail: String },

    #[error("pod {pod} did not start in time, last phase {phase}{detail}")]
    PodStartTimeout {
        pod: String,
        phase: PodPhase,
        detail: String,
    },

    #[error("service {0} failed to start after {1} retries")]
    ServiceNotReady(String, u32),

    #[error("unsupported endpoint type {endpoint_type} for service {service}")]
    UnsupportedEndpoint {
        service: String,
        endpoint_type: String,
    },

    #[error("namespace {0} failed to terminate after {1} retries")]
    NamespaceNotTerminated(String, u32),

    #[error("workload {0} has no endpoint definition")]
    MissingEndpoint(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("resource client error: {0}")]
    Client(#[from] ClientError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RolloutError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RolloutError::Protocol(_) | RolloutError::Client(ClientError::Protocol(_)) => {
                ErrorClass::Protocol
            }
            RolloutError::Client(e) if e.is_transient() => ErrorClass::Transient,
            _ => ErrorClass::Terminal,
        }
    }

    /// Whether the failure is an exhausted wait rather than an observed fault.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            RolloutError::ReplicasNotCreated(..)
                | RolloutError::PodNotScheduled(..)
                | RolloutError::PodStartTimeout { .. }
                | RolloutError::ServiceNotReady(..)
                | RolloutError::NamespaceNotTerminated(..)
        )
    }
}

pub type RolloutResult<T> = Result<T, RolloutError>;
