//! JSON over plain HTTP to the orchestrator, with basic auth.

use base64::Engine;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    authorization: HeaderValue,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpTransport {
    pub fn new(base_url: &str, username: &str, password: &str) -> PipelineResult<Self> {
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
        let authorization = HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(|e| PipelineError::Transport(format!("invalid auth header: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization,
            client: Client::builder(TokioExecutor::new()).build_http(),
        })
    }

    fn build(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> PipelineResult<Request<Full<Bytes>>> {
        let uri = format!("{}{}", self.base_url, path);
        Request::builder()
            .method(method)
            .uri(&uri)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, self.authorization.clone())
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| PipelineError::Transport(format!("failed to build request for {uri}: {e}")))
    }

    /// Send a request and read the whole response body.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> PipelineResult<(StatusCode, Bytes)> {
        let request = self.build(method.clone(), path, body)?;
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| PipelineError::Transport(format!("{method} {path}: {e}")))?;
        let status = response.status();
        debug!(%method, path, status = status.as_u16(), "orchestrator request completed");
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| PipelineError::Transport(format!("{method} {path}: {e}")))?
            .to_bytes();
        Ok((status, bytes))
    }

    pub async fn send_json<T: serde::Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> PipelineResult<(StatusCode, Bytes)> {
        let encoded = serde_json::to_vec(body)?;
        self.send(method, path, Some(encoded)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_carry_basic_auth_and_json_type() {
        let transport = HttpTransport::new("http://orcs:30080/", "admin", "nazgul").unwrap();
        let request = transport.build(Method::GET, "/hub-web-api/site", None).unwrap();
        assert_eq!(request.uri(), "http://orcs:30080/hub-web-api/site");
        assert_eq!(request.headers()[AUTHORIZATION], "Basic YWRtaW46bmF6Z3Vs");
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let transport = HttpTransport::new("http://127.0.0.1:1", "admin", "nazgul").unwrap();
        let err = transport.send(Method::GET, "/site-api/state", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
    }
}
