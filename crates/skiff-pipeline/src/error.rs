use skiff_client::ClientError;
use skiff_rollout::{ErrorClass, Retryable, RolloutError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Rollout(#[from] RolloutError),

    /// Cluster access outside a rollout, such as connecting.
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("orchestrator request failed: {0}")]
    Transport(String),

    #[error("orchestrator returned {status} for {path}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("cannot resolve route for service {service}: {reason}")]
    Route { service: String, reason: String },

    #[error("command {command} on {service} returned {actual}, expected {expected}")]
    Command {
        service: String,
        command: String,
        expected: u16,
        actual: u16,
        body: String,
    },

    #[error("service endpoint {endpoint} failed starting after {retries} retries")]
    ServiceNotStarted { endpoint: String, retries: u32 },

    #[error("could not find site with urn {0}")]
    SiteNotFound(String),

    #[error("site name is not defined, pass a site name or a local cluster ip")]
    MissingSiteName,

    #[error("failed encoding orchestrator payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::Rollout(e) => e.class(),
            PipelineError::Client(ClientError::Protocol(_)) => ErrorClass::Protocol,
            PipelineError::Client(e) if e.is_transient() => ErrorClass::Transient,
            PipelineError::Transport(_) => ErrorClass::Transient,
            PipelineError::Status { status, .. } if *status >= 500 => ErrorClass::Transient,
            _ => ErrorClass::Terminal,
        }
    }
}

impl Retryable for PipelineError {
    fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
