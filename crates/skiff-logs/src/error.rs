use skiff_client::ClientError;
use skiff_core::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed opening log stream of pod {pod}: {source}")]
    Open {
        pod: String,
        #[source]
        source: ClientError,
    },

    #[error("log stream of pod {pod} broke: {source}")]
    Read {
        pod: String,
        #[source]
        source: ClientError,
    },

    #[error("pod discovery failed: {0}")]
    Discovery(#[source] ClientError),

    #[error("relay configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RelayError {
    /// Whether the cluster refused to open a stream because the pod is not
    /// running yet. Such refusals are routine right after a deploy.
    pub fn is_pending(&self) -> bool {
        match self {
            RelayError::Open {
                source: ClientError::Status { status, .. },
                ..
            } => (400..500).contains(status),
            _ => false,
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_container_is_pending() {
        let transient = RelayError::Open {
            pod: "p".into(),
            source: ClientError::Transport("reset".into()),
        };
        assert!(!transient.is_pending());

        let rejected = RelayError::Open {
            pod: "p".into(),
            source: ClientError::Status {
                status: 400,
                reason: "BadRequest".into(),
                message: "container \"shop\" in pod \"p\" is waiting to start: ContainerCreating"
                    .into(),
            },
        };
        assert!(rejected.is_pending());
        assert!(rejected.to_string().contains("ContainerCreating"));

        let unavailable = RelayError::Open {
            pod: "p".into(),
            source: ClientError::Status {
                status: 503,
                reason: "ServiceUnavailable".into(),
                message: "etcd".into(),
            },
        };
        assert!(!unavailable.is_pending());
    }
}
