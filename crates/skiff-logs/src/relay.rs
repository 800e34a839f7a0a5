//! Pod discovery and per-pod follower tasks.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use skiff_client::{ResourceClient, ResourceKind};
use skiff_core::{APP_LABEL, Labels};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::message::LogMessage;
use crate::session::{LogStream, Session};

/// Consecutive pending refusals between two warnings about the same pod.
const OPEN_WARN_EVERY: u32 = 30;

/// Entry point of the relay. Cheap to clone.
#[derive(Clone)]
pub struct LogRelay {
    client: Arc<dyn ResourceClient>,
    config: RelayConfig,
}

impl LogRelay {
    pub fn new(client: Arc<dyn ResourceClient>, config: RelayConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Start relaying the logs of every pod labelled `app=<app_id>`.
    ///
    /// Returns immediately; discovery runs in the background until it finds
    /// pods or the session is cancelled.
    pub fn subscribe(&self, app_id: &str) -> Session {
        let (tx, rx) = mpsc::channel(self.config.capacity);
        let token = CancellationToken::new();
        let streams = Arc::new(Mutex::new(Vec::new()));

        let discovery = Discovery {
            client: Arc::clone(&self.client),
            config: self.config.clone(),
            app_id: app_id.to_string(),
            tx,
            token: token.clone(),
            streams: Arc::clone(&streams),
        };
        info!(app_id, "log session opened");
        let handle = tokio::spawn(discovery.run());
        Session::new(app_id, rx, token, streams, handle)
    }
}

pub(crate) type StreamTable = Arc<Mutex<Vec<LogStream>>>;

struct Discovery {
    client: Arc<dyn ResourceClient>,
    config: RelayConfig,
    app_id: String,
    tx: mpsc::Sender<LogMessage>,
    token: CancellationToken,
    streams: StreamTable,
}

impl Discovery {
    async fn run(self) {
        let selector = Labels::from([(APP_LABEL.to_string(), self.app_id.clone())]);
        let mut seen = HashSet::new();

        loop {
            if self.discover(&selector, &mut seen).await > 0 {
                break;
            }
            debug!(app_id = %self.app_id, "no pods yet");
            tokio::select! {
                _ = self.token.cancelled() => {
                    debug!(app_id = %self.app_id, "session closed during discovery");
                    return;
                }
                _ = tokio::time::sleep(self.config.discovery_interval) => {}
            }
        }

        let Some(every) = self.config.rediscover_interval else {
            return;
        };
        loop {
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep(every) => {}
            }
            let added = self.discover(&selector, &mut seen).await;
            if added > 0 {
                info!(app_id = %self.app_id, added, "following new pods");
            }
        }
    }

    /// List matching pods once and follow those not seen before. Returns how
    /// many followers were started.
    async fn discover(&self, selector: &Labels, seen: &mut HashSet<String>) -> usize {
        let listed = tokio::select! {
            _ = self.token.cancelled() => return 0,
            listed = self.client.list(ResourceKind::Pod, selector) => listed,
        };
        let pods = match listed {
            Ok(pods) => pods,
            Err(e) => {
                let e = RelayError::Discovery(e);
                warn!(app_id = %self.app_id, error = %e, "pod listing failed, retrying");
                return 0;
            }
        };

        let mut added = 0;
        for pod in pods {
            let name = pod.name().to_string();
            if self.token.is_cancelled() || !seen.insert(name.clone()) {
                continue;
            }
            let token = self.token.child_token();
            let task = tokio::spawn(follow(
                Arc::clone(&self.client),
                name.clone(),
                self.app_id.clone(),
                self.tx.clone(),
                token.clone(),
                self.config.clone(),
            ));
            self.streams
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(LogStream::new(name, token, task));
            added += 1;
        }
        added
    }
}

/// Follow one pod until its stream ends or the token fires. Opening is
/// retried on any failure, since a pod reports 4xx while its container is
/// still being created. The close handle of a successfully opened stream
/// runs exactly once.
async fn follow(
    client: Arc<dyn ResourceClient>,
    pod: String,
    service_id: String,
    tx: mpsc::Sender<LogMessage>,
    token: CancellationToken,
    config: RelayConfig,
) {
    let mut failures: u32 = 0;
    let follower = loop {
        let opened = tokio::select! {
            _ = token.cancelled() => return,
            opened = client.follow_log(&pod) => opened,
        };
        match opened {
            Ok(follower) => break follower,
            Err(source) => {
                let e = RelayError::Open {
                    pod: pod.clone(),
                    source,
                };
                failures += 1;
                if !e.is_pending() || failures % OPEN_WARN_EVERY == 0 {
                    warn!(pod = %pod, failures, error = %e, "log stream still unavailable, retrying");
                } else {
                    debug!(pod = %pod, error = %e, "log stream not available yet, retrying");
                }
            }
        }
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(config.open_retry) => {}
        }
    };

    info!(pod = %pod, "following pod logs");
    let (mut lines, close) = follower.into_parts();
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = lines.next() => next,
        };
        match next {
            Some(Ok(line)) => {
                let message = LogMessage::out(line, &service_id);
                let sent = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    sent = tx.send(message) => sent,
                };
                if sent.is_err() {
                    debug!(pod = %pod, "session receiver gone");
                    break;
                }
            }
            Some(Err(source)) => {
                let e = RelayError::Read {
                    pod: pod.clone(),
                    source,
                };
                warn!(pod = %pod, error = %e, "log stream failed");
                break;
            }
            None => {
                debug!(pod = %pod, "log stream ended");
                break;
            }
        }
    }
    drop(lines);
    close.close();
    debug!(pod = %pod, "log stream closed");
}
