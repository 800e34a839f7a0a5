//! Resource client error types.

use thiserror::Error;

use crate::resource::ResourceKind;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{kind} {name} already exists")]
    Conflict { kind: ResourceKind, name: String },

    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("cluster returned {status} {reason}: {message}")]
    Status {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether a polling loop may retry after this error.
    ///
    /// Objects can be briefly invisible right after creation, and server
    /// errors are usually temporary.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(_) | ClientError::NotFound { .. } => true,
            ClientError::Status { status, .. } => *status >= 500,
            ClientError::Conflict { .. } | ClientError::Protocol(_) | ClientError::Config(_) => {
                false
            }
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Protocol(e.to_string())
    }
}

impl From<kube::Error> for ClientError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(response) => ClientError::Status {
                status: response.code,
                reason: response.reason,
                message: response.message,
            },
            kube::Error::SerdeError(e) => ClientError::Protocol(e.to_string()),
            other => ClientError::Transport(other.to_string()),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ClientError::Transport("reset".into()).is_transient());
        assert!(
            ClientError::NotFound {
                kind: ResourceKind::Pod,
                name: "p".into()
            }
            .is_transient()
        );
        assert!(
            ClientError::Status {
                status: 503,
                reason: "ServiceUnavailable".into(),
                message: String::new()
            }
            .is_transient()
        );
        assert!(!ClientError::Protocol("bad".into()).is_transient());
        assert!(
            !ClientError::Conflict {
                kind: ResourceKind::Service,
                name: "s".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn api_errors_keep_code_and_reason() {
        let err = ClientError::from(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".into(),
            message: "container \"shop\" in pod \"shop-1\" is waiting to start: ContainerCreating"
                .into(),
            reason: "BadRequest".into(),
            code: 400,
        }));
        assert!(matches!(
            err,
            ClientError::Status { status: 400, ref reason, .. } if reason == "BadRequest"
        ));
        assert!(!err.is_transient());

        let err = ClientError::from(kube::Error::SerdeError(
            serde_json::from_str::<u8>("x").unwrap_err(),
        ));
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
