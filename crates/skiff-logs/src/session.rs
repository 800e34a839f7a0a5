//! A log relay session and the followers it owns.

use std::sync::PoisonError;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::message::LogMessage;
use crate::relay::StreamTable;

/// One followed pod: its task and the token that stops it.
#[derive(Debug)]
pub struct LogStream {
    pod: String,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl LogStream {
    pub(crate) fn new(pod: String, token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { pod, token, task }
    }

    pub fn pod(&self) -> &str {
        &self.pod
    }
}

/// Live logs of one application.
///
/// Dropping the session cancels everything it owns; [`Session::close`]
/// additionally waits for the followers to release their streams.
pub struct Session {
    app_id: String,
    rx: mpsc::Receiver<LogMessage>,
    token: CancellationToken,
    streams: StreamTable,
    discovery: Option<JoinHandle<()>>,
}

impl Session {
    pub(crate) fn new(
        app_id: &str,
        rx: mpsc::Receiver<LogMessage>,
        token: CancellationToken,
        streams: StreamTable,
        discovery: JoinHandle<()>,
    ) -> Self {
        Self {
            app_id: app_id.to_string(),
            rx,
            token,
            streams,
            discovery: Some(discovery),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Next relayed line. `None` once the session is cancelled, or when every
    /// follower has ended and discovery is over.
    pub async fn next(&mut self) -> Option<LogMessage> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            message = self.rx.recv() => message,
        }
    }

    /// Number of pods followed so far.
    pub fn stream_count(&self) -> usize {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn pods(&self) -> Vec<String> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.pod().to_string())
            .collect()
    }

    /// Stop the session without waiting. Followers release their streams on
    /// their own.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the session and wait until every follower has released its
    /// stream.
    pub async fn close(mut self) {
        self.token.cancel();
        if let Some(discovery) = self.discovery.take() {
            let _ = discovery.await;
        }
        let streams: Vec<LogStream> = std::mem::take(
            &mut *self.streams.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let count = streams.len();
        for stream in streams {
            stream.token.cancel();
            if let Err(e) = stream.task.await {
                debug!(pod = %stream.pod, error = %e, "follower task did not finish cleanly");
            }
        }
        info!(app_id = %self.app_id, streams = count, "log session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use skiff_client::testkit::ScriptedClient;
    use skiff_core::{Labels, ObjectMeta, Pod};
    use tokio::time::Instant;

    use crate::config::RelayConfig;
    use crate::relay::LogRelay;

    fn pod(name: &str, app: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(Labels::from([("app".to_string(), app.to_string())])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn relay(client: &ScriptedClient, config: RelayConfig) -> LogRelay {
        LogRelay::new(Arc::new(client.clone()), config)
    }

    #[tokio::test(start_paused = true)]
    async fn flaky_open_loses_nothing_after_success() {
        let client = ScriptedClient::new();
        for name in ["shop-1", "shop-2", "shop-3"] {
            client.insert(pod(name, "shop"));
            client.preload_lines(name, &[&format!("hello from {name}")]);
        }
        client.fail_follow("shop-2", 2);

        let mut session = relay(&client, RelayConfig::default()).subscribe("shop");
        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(session.next().await.unwrap().message);
        }
        received.sort();
        assert_eq!(
            received,
            vec!["hello from shop-1", "hello from shop-2", "hello from shop-3"]
        );
        assert_eq!(client.follow_attempts("shop-2"), 3);

        assert_eq!(client.push_line("shop-2", "after reconnect"), 1);
        let late = session.next().await.unwrap();
        assert_eq!(late.message, "after reconnect");
        assert_eq!(late.service_id, "shop");

        session.close().await;
        assert_eq!(client.total_closes(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_container_is_retried_until_it_starts() {
        let client = ScriptedClient::new();
        client.insert(pod("shop-1", "shop"));
        client.preload_lines("shop-1", &["started"]);
        client.fail_follow_with_status("shop-1", 2, 400);

        let config = RelayConfig {
            open_retry: Duration::from_secs(1),
            ..Default::default()
        };
        let start = Instant::now();
        let mut session = relay(&client, config).subscribe("shop");
        let first = session.next().await.unwrap();
        assert_eq!(first.message, "started");
        assert_eq!(client.follow_attempts("shop-1"), 3);
        assert!(start.elapsed() >= Duration::from_secs(2));

        session.close().await;
        assert_eq!(client.close_count("shop-1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_blocks_without_dropping() {
        let client = ScriptedClient::new();
        let pods = ["shop-1", "shop-2", "shop-3"];
        let mut expected = Vec::new();
        for name in pods {
            client.insert(pod(name, "shop"));
            let lines: Vec<String> = (0..5).map(|i| format!("{name} line {i}")).collect();
            let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
            client.preload_lines(name, &refs);
            expected.extend(lines);
        }

        let config = RelayConfig {
            capacity: 2,
            ..Default::default()
        };
        let mut session = relay(&client, config).subscribe("shop");
        // Let every producer fill the queue and park on its next send.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(session.stream_count(), pods.len());

        let mut received = Vec::new();
        for _ in 0..expected.len() {
            received.push(session.next().await.unwrap().message);
        }

        // Lines of one pod keep their order.
        for name in pods {
            let own: Vec<&String> = received
                .iter()
                .filter(|l| l.starts_with(&format!("{name} ")))
                .collect();
            let sent: Vec<&String> = expected
                .iter()
                .filter(|l| l.starts_with(&format!("{name} ")))
                .collect();
            assert_eq!(own, sent);
        }

        // Every line arrives exactly once.
        received.sort();
        expected.sort();
        assert_eq!(received, expected);

        session.cancel();
        assert!(session.next().await.is_none());
        session.close().await;
        assert_eq!(client.total_closes(), pods.len());
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_producer_does_not_prevent_close() {
        let client = ScriptedClient::new();
        client.insert(pod("shop-1", "shop"));
        client.preload_lines("shop-1", &["a", "b", "c", "d"]);

        let config = RelayConfig {
            capacity: 1,
            ..Default::default()
        };
        let session = relay(&client, config).subscribe("shop");
        tokio::time::sleep(Duration::from_secs(5)).await;

        tokio::time::timeout(Duration::from_secs(1), session.close())
            .await
            .unwrap();
        assert_eq!(client.close_count("shop-1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn every_stream_is_closed_once() {
        let client = ScriptedClient::new();
        let names = ["shop-a", "shop-b", "shop-c", "shop-d"];
        for name in names {
            client.insert(pod(name, "shop"));
            client.preload_lines(name, &["up"]);
        }
        client.insert(pod("other-1", "other"));

        let mut session = relay(&client, RelayConfig::default()).subscribe("shop");
        for _ in 0..names.len() {
            session.next().await.unwrap();
        }
        assert_eq!(session.stream_count(), 4);
        session.close().await;

        for name in names {
            assert_eq!(client.close_count(name), 1);
        }
        assert_eq!(client.follow_attempts("other-1"), 0);
        assert_eq!(client.total_closes(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_discovery_is_clean() {
        let client = ScriptedClient::new();
        let mut session = relay(&client, RelayConfig::default()).subscribe("ghost");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(session.stream_count(), 0);

        session.cancel();
        assert!(session.next().await.is_none());
        session.close().await;
        assert_eq!(client.total_closes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ends_when_all_streams_end() {
        let client = ScriptedClient::new();
        client.insert(pod("job-1", "job"));
        client.preload_lines("job-1", &["done"]);

        let mut session = relay(&client, RelayConfig::default()).subscribe("job");
        assert_eq!(session.next().await.unwrap().message, "done");
        client.end_logs("job-1");
        assert!(session.next().await.is_none());
        assert_eq!(client.close_count("job-1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rediscovery_follows_new_pods() {
        let client = ScriptedClient::new();
        client.insert(pod("shop-1", "shop"));
        client.preload_lines("shop-1", &["first"]);

        let config = RelayConfig {
            rediscover_interval: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        let mut session = relay(&client, config).subscribe("shop");
        assert_eq!(session.next().await.unwrap().message, "first");

        client.insert(pod("shop-2", "shop"));
        client.preload_lines("shop-2", &["second"]);
        let next = session.next().await.unwrap();
        assert_eq!(next.message, "second");
        assert_eq!(session.pods(), vec!["shop-1", "shop-2"]);

        session.close().await;
        assert_eq!(client.total_closes(), 2);
    }
}
