//! The orchestrator's command API.
//!
//! Hosted services live under `{root}/{service}-api`. Each reports its
//! lifecycle on `/state` and accepts commands as JSON posts to
//! `/commands/{name}`.

use std::future::Future;
use std::pin::Pin;

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::transport::HttpTransport;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "nazgul";

pub type OrchestratorFuture<'a, T> = Pin<Box<dyn Future<Output = PipelineResult<T>> + Send + 'a>>;

/// A site known to the orchestrator's hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub urn: String,
}

pub trait Orchestrator: Send + Sync {
    /// The `state` field reported by a hosted service, if it reported one.
    fn service_state<'a>(
        &'a self,
        root: &'a str,
        endpoint: &'a str,
    ) -> OrchestratorFuture<'a, Option<String>>;

    fn sites<'a>(&'a self, root: &'a str) -> OrchestratorFuture<'a, Vec<Site>>;

    /// Post a command and require the given response status.
    fn post_command<'a>(
        &'a self,
        root: &'a str,
        service: &'a str,
        command: &'a str,
        body: Value,
        expected: StatusCode,
    ) -> OrchestratorFuture<'a, ()>;
}

/// Orchestrator reached over HTTP with the admin credentials.
#[derive(Debug, Clone, Default)]
pub struct HttpOrchestrator;

impl HttpOrchestrator {
    pub fn new() -> Self {
        Self
    }

    fn transport(&self, root: &str) -> PipelineResult<HttpTransport> {
        HttpTransport::new(root, ADMIN_USERNAME, ADMIN_PASSWORD)
    }

    async fn state_inner(&self, root: &str, endpoint: &str) -> PipelineResult<Option<String>> {
        let path = format!("/{endpoint}/state");
        let (status, body) = self.transport(root)?.send(Method::GET, &path, None).await?;
        debug!(endpoint, status = status.as_u16(), "service state polled");
        let Ok(state) = serde_json::from_slice::<Value>(&body) else {
            return Ok(None);
        };
        Ok(state
            .get("state")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn sites_inner(&self, root: &str) -> PipelineResult<Vec<Site>> {
        let path = "/hub-web-api/site";
        let (status, body) = self.transport(root)?.send(Method::GET, path, None).await?;
        if status != StatusCode::OK {
            return Err(PipelineError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn command_inner(
        &self,
        root: &str,
        service: &str,
        command: &str,
        body: Value,
        expected: StatusCode,
    ) -> PipelineResult<()> {
        let path = format!("/{service}-api/commands/{command}");
        let (status, response) = self
            .transport(root)?
            .send_json(Method::POST, &path, &body)
            .await?;
        debug!(service, command, status = status.as_u16(), "command posted");
        if status != expected {
            return Err(PipelineError::Command {
                service: service.to_string(),
                command: command.to_string(),
                expected: expected.as_u16(),
                actual: status.as_u16(),
                body: String::from_utf8_lossy(&response).into_owned(),
            });
        }
        Ok(())
    }
}

impl Orchestrator for HttpOrchestrator {
    fn service_state<'a>(
        &'a self,
        root: &'a str,
        endpoint: &'a str,
    ) -> OrchestratorFuture<'a, Option<String>> {
        Box::pin(self.state_inner(root, endpoint))
    }

    fn sites<'a>(&'a self, root: &'a str) -> OrchestratorFuture<'a, Vec<Site>> {
        Box::pin(self.sites_inner(root))
    }

    fn post_command<'a>(
        &'a self,
        root: &'a str,
        service: &'a str,
        command: &'a str,
        body: Value,
        expected: StatusCode,
    ) -> OrchestratorFuture<'a, ()> {
        Box::pin(self.command_inner(root, service, command, body, expected))
    }
}

#[cfg(test)]
mod tests {
    use skiff_rollout::Retryable;

    use super::*;

    #[test]
    fn site_listing_decodes() {
        let sites: Vec<Site> =
            serde_json::from_str(r#"[{"id":"s-1","name":"lab","urn":"site","extra":1}]"#).unwrap();
        assert_eq!(sites[0].id, "s-1");
        assert_eq!(sites[0].urn, "site");
    }

    #[tokio::test]
    async fn unreachable_orchestrator_is_transient() {
        let orchestrator = HttpOrchestrator::new();
        let err = orchestrator
            .service_state("http://127.0.0.1:1", "site-api")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
        assert!(err.is_transient());
    }
}
