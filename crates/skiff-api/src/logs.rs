//! App-service log streaming over WebSocket.
//!
//! The descriptor endpoint tells the caller where to connect; the data
//! endpoint upgrades and relays every line of the app's pods as a JSON text
//! frame until either side closes.

use axum::Json;
use std::fmt::Display;

use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::{OriginalUri, Path, State};
use axum::http::HeaderMap;
use axum::http::header::HOST;
use axum::response::IntoResponse;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use skiff_logs::Session;
use tracing::{debug, info, warn};

use crate::ApiState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct LogSocketInfo {
    pub address: String,
    pub serialization: &'static str,
}

/// GET /k8spsb-api/psb/app-services/{space}/{id}/logs
pub async fn log_socket_info(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> impl IntoResponse {
    let host = state
        .settings
        .in_cluster_address
        .clone()
        .or_else(|| {
            headers
                .get(HOST)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "localhost".to_string());
    let address = format!("ws://{host}{}/data", uri.path());
    debug!(address = %address, "log socket address");
    Json(LogSocketInfo {
        address,
        serialization: "json",
    })
}

/// GET /k8spsb-api/psb/app-services/{space}/{id}/logs/data
pub async fn log_stream(
    State(state): State<ApiState>,
    Path((_space, id)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    if id.is_empty() {
        return Err(ApiError::bad_request("invalid empty appServiceId parameter"));
    }
    Ok(ws.on_upgrade(move |socket| async move {
        let session = state.relay.subscribe(&id);
        let (sender, receiver) = socket.split();
        relay_to_socket(sender, receiver, session).await;
    }))
}

/// Forward session messages to the socket until the client goes away, then
/// tear the session down.
pub(crate) async fn relay_to_socket<W, R, E>(mut sender: W, mut receiver: R, mut session: Session)
where
    W: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let app_id = session.app_id().to_string();
    info!(app_id = %app_id, "log socket opened");

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    debug!(app_id = %app_id, "log socket closed by client");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(app_id = %app_id, error = %e, "log socket error");
                    break;
                }
            },
            message = session.next() => {
                let Some(message) = message else { break };
                let frame = match serde_json::to_string(&message) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(app_id = %app_id, error = %e, "failed encoding log message");
                        continue;
                    }
                };
                if sender.send(Message::Text(frame.into())).await.is_err() {
                    debug!(app_id = %app_id, "log socket write failed");
                    break;
                }
            }
        }
    }

    let streams = session.stream_count();
    session.close().await;
    let _ = sender.close().await;
    info!(app_id = %app_id, streams, "log socket closed");
}
