//! [`ResourceClient`] backed by a `kube::Client`.

use std::fmt::Debug;
use std::time::Duration;

use futures_util::io::AsyncBufReadExt;
use futures_util::{StreamExt, TryStreamExt};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::{Client, Config};
use serde::Serialize;
use serde::de::DeserializeOwned;
use skiff_core::{ClusterConfig, Event, Labels, Namespace, Pod, ReplicationController, Service};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::client::{Applied, ClientFuture, CloseHandle, LogFollower, ResourceClient};
use crate::credentials::Credentials;
use crate::error::{ClientError, ClientResult};
use crate::resource::{Resource, ResourceKind};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    namespace: String,
}

impl KubeClient {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
        }
    }

    /// Client configuration for a cluster section. In-cluster runs use the
    /// pod's service account; explicit credentials replace it.
    pub fn config(cluster: &ClusterConfig) -> ClientResult<Config> {
        let mut config = if cluster.in_cluster {
            Config::incluster()
                .map_err(|e| ClientError::Config(format!("in-cluster configuration: {e}")))?
        } else {
            let url = cluster.url.parse::<http::Uri>().map_err(|e| {
                ClientError::Config(format!("invalid cluster url {}: {e}", cluster.url))
            })?;
            Config::new(url)
        };
        config.default_namespace = cluster.namespace.clone();
        config.connect_timeout = Some(CONNECT_TIMEOUT);
        // Followed logs stay silent for as long as the pod does.
        config.read_timeout = None;
        if cluster.insecure_skip_tls_verify {
            config.accept_invalid_certs = true;
        }
        let credentials = Credentials::from_cluster(cluster);
        debug!(?credentials, in_cluster = cluster.in_cluster, "cluster credentials");
        credentials.apply(&mut config.auth_info);
        Ok(config)
    }

    /// Build a client and verify the API server answers.
    pub async fn connect(cluster: &ClusterConfig) -> ClientResult<Self> {
        let config = Self::config(cluster)?;
        let url = config.cluster_url.to_string();
        let client = Client::try_from(config)?;
        let version = client.apiserver_version().await?;
        info!(
            %url,
            namespace = %cluster.namespace,
            version = %version.git_version,
            "connected to cluster api"
        );
        Ok(Self::new(client, &cluster.namespace))
    }

    fn namespaced<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    async fn create_inner(&self, resource: Resource, force: bool) -> ClientResult<Applied<Resource>> {
        let kind = resource.kind();
        let name = resource.name().to_string();
        let applied = match resource {
            Resource::Namespace(r) => {
                create_object(&self.namespaces(), kind, &name, r, force)
                    .await?
                    .map(Resource::from)
            }
            Resource::ReplicationController(r) => {
                create_object(&self.namespaced(), kind, &name, r, force)
                    .await?
                    .map(Resource::from)
            }
            Resource::Service(r) => {
                create_object(&self.namespaced(), kind, &name, r, force)
                    .await?
                    .map(Resource::from)
            }
            Resource::Pod(r) => {
                create_object(&self.namespaced(), kind, &name, r, force)
                    .await?
                    .map(Resource::from)
            }
        };
        Ok(applied)
    }

    async fn get_inner(&self, kind: ResourceKind, name: &str) -> ClientResult<Resource> {
        Ok(match kind {
            ResourceKind::Namespace => get_object(&self.namespaces(), kind, name).await?.into(),
            ResourceKind::ReplicationController => {
                get_object::<ReplicationController>(&self.namespaced(), kind, name)
                    .await?
                    .into()
            }
            ResourceKind::Service => {
                get_object::<Service>(&self.namespaced(), kind, name).await?.into()
            }
            ResourceKind::Pod => get_object::<Pod>(&self.namespaced(), kind, name).await?.into(),
        })
    }

    async fn list_inner(&self, kind: ResourceKind, selector: &Labels) -> ClientResult<Vec<Resource>> {
        let params = list_params(selector);
        Ok(match kind {
            ResourceKind::Namespace => into_resources(self.namespaces().list(&params).await?.items),
            ResourceKind::ReplicationController => into_resources(
                self.namespaced::<ReplicationController>()
                    .list(&params)
                    .await?
                    .items,
            ),
            ResourceKind::Service => {
                into_resources(self.namespaced::<Service>().list(&params).await?.items)
            }
            ResourceKind::Pod => into_resources(self.namespaced::<Pod>().list(&params).await?.items),
        })
    }

    async fn delete_inner(&self, kind: ResourceKind, name: &str) -> ClientResult<()> {
        match kind {
            ResourceKind::Namespace => delete_object(&self.namespaces(), kind, name).await,
            ResourceKind::ReplicationController => {
                delete_object::<ReplicationController>(&self.namespaced(), kind, name).await
            }
            ResourceKind::Service => delete_object::<Service>(&self.namespaced(), kind, name).await,
            ResourceKind::Pod => delete_object::<Pod>(&self.namespaced(), kind, name).await,
        }
    }

    async fn follow_inner(&self, pod: &str) -> ClientResult<LogFollower> {
        let params = LogParams {
            follow: true,
            ..Default::default()
        };
        let reader = self
            .namespaced::<Pod>()
            .log_stream(pod, &params)
            .await
            .map_err(|e| not_found_or(ResourceKind::Pod, pod, e))?;

        // Firing (or dropping) the close handle ends the stream, which drops
        // the reader and with it the connection.
        let (closed_tx, closed_rx) = oneshot::channel::<()>();
        let lines = reader
            .lines()
            .map_err(|e| ClientError::Transport(format!("log stream: {e}")))
            .take_until(async move {
                let _ = closed_rx.await;
            });
        let pod_name = pod.to_string();
        let close = CloseHandle::new(move || {
            debug!(pod = %pod_name, "closing log stream");
            let _ = closed_tx.send(());
        });
        debug!(pod, "following logs");
        Ok(LogFollower::new(Box::pin(lines), close))
    }

    async fn events_inner(&self, uid: &str) -> ClientResult<Vec<Event>> {
        let params = ListParams::default().fields(&format!("involvedObject.uid={uid}"));
        Ok(self.namespaced::<Event>().list(&params).await?.items)
    }
}

async fn create_object<K>(
    api: &Api<K>,
    kind: ResourceKind,
    name: &str,
    object: K,
    force: bool,
) -> ClientResult<Applied<K>>
where
    K: Clone + DeserializeOwned + Serialize + Debug,
{
    match api.create(&PostParams::default(), &object).await {
        Ok(created) => Ok(Applied::Created(created)),
        Err(kube::Error::Api(e)) if e.code == 409 => {
            if !force {
                return Err(ClientError::Conflict {
                    kind,
                    name: name.to_string(),
                });
            }
            debug!(%kind, name, "already exists, adopting");
            Ok(Applied::Adopted(get_object(api, kind, name).await?))
        }
        Err(e) => Err(e.into()),
    }
}

async fn get_object<K>(api: &Api<K>, kind: ResourceKind, name: &str) -> ClientResult<K>
where
    K: Clone + DeserializeOwned + Debug,
{
    api.get(name).await.map_err(|e| not_found_or(kind, name, e))
}

async fn delete_object<K>(api: &Api<K>, kind: ResourceKind, name: &str) -> ClientResult<()>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        // 409 means deletion is already under way.
        Err(kube::Error::Api(e)) if e.code == 409 => Ok(()),
        Err(e) => Err(not_found_or(kind, name, e)),
    }
}

fn not_found_or(kind: ResourceKind, name: &str, e: kube::Error) -> ClientError {
    match e {
        kube::Error::Api(e) if e.code == 404 => ClientError::NotFound {
            kind,
            name: name.to_string(),
        },
        other => other.into(),
    }
}

fn into_resources<K: Into<Resource>>(items: Vec<K>) -> Vec<Resource> {
    items.into_iter().map(Into::into).collect()
}

/// `k1=v1,k2=v2`; every entry must match.
fn label_selector(selector: &Labels) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn list_params(selector: &Labels) -> ListParams {
    if selector.is_empty() {
        ListParams::default()
    } else {
        ListParams::default().labels(&label_selector(selector))
    }
}

impl ResourceClient for KubeClient {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn create<'a>(&'a self, resource: Resource, force: bool) -> ClientFuture<'a, Applied<Resource>> {
        Box::pin(self.create_inner(resource, force))
    }

    fn get<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, Resource> {
        Box::pin(self.get_inner(kind, name))
    }

    fn list<'a>(
        &'a self,
        kind: ResourceKind,
        selector: &'a Labels,
    ) -> ClientFuture<'a, Vec<Resource>> {
        Box::pin(self.list_inner(kind, selector))
    }

    fn delete<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, ()> {
        Box::pin(self.delete_inner(kind, name))
    }

    fn follow_log<'a>(&'a self, pod: &'a str) -> ClientFuture<'a, LogFollower> {
        Box::pin(self.follow_inner(pod))
    }

    fn list_events<'a>(&'a self, uid: &'a str) -> ClientFuture<'a, Vec<Event>> {
        Box::pin(self.events_inner(uid))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::convert::Infallible;

    use axum::Json;
    use axum::Router;
    use axum::body::Body;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use futures_util::stream;
    use serde_json::json;
    use skiff_core::{ObjectExt, ServiceExt, object_meta};

    use super::*;

    fn failure(code: StatusCode, reason: &str, message: &str) -> Response {
        let body = json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": code.as_u16(),
        });
        (code, Json(body)).into_response()
    }

    async fn version() -> Json<serde_json::Value> {
        Json(json!({
            "major": "1", "minor": "30", "gitVersion": "v1.30.0", "gitCommit": "",
            "gitTreeState": "clean", "buildDate": "", "goVersion": "go1.22",
            "compiler": "gc", "platform": "linux/amd64"
        }))
    }

    async fn service(Path(name): Path<String>) -> Response {
        if name != "shop" {
            return failure(StatusCode::NOT_FOUND, "NotFound", "services not found");
        }
        Json(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "shop", "uid": "svc-1"},
            "spec": {"type": "NodePort", "ports": [{"port": 80, "nodePort": 30080}]}
        }))
        .into_response()
    }

    // Names the single pod after the label selector it was listed with.
    async fn pods(Query(query): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
        let selector = query.get("labelSelector").cloned().unwrap_or_default();
        Json(json!({
            "apiVersion": "v1",
            "kind": "PodList",
            "metadata": {},
            "items": [{"metadata": {"name": selector}}]
        }))
    }

    async fn pod_log(
        Path(name): Path<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Response {
        if query.get("follow").map(String::as_str) != Some("true") {
            return failure(StatusCode::BAD_REQUEST, "BadRequest", "expected a followed log");
        }
        match name.as_str() {
            "shop-1" => {
                let lines = stream::iter([Ok::<_, Infallible>("one\n"), Ok("two\n")])
                    .chain(stream::pending());
                Body::from_stream(lines).into_response()
            }
            "shop-2" => failure(
                StatusCode::BAD_REQUEST,
                "BadRequest",
                "container \"shop\" in pod \"shop-2\" is waiting to start: ContainerCreating",
            ),
            _ => failure(StatusCode::NOT_FOUND, "NotFound", "pods not found"),
        }
    }

    async fn events(Query(query): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
        let selector = query.get("fieldSelector").cloned().unwrap_or_default();
        Json(json!({
            "apiVersion": "v1",
            "kind": "EventList",
            "metadata": {},
            "items": [{
                "metadata": {"name": "e-1"},
                "involvedObject": {},
                "reason": "Pulling",
                "message": selector
            }]
        }))
    }

    /// Serve a minimal API server on an ephemeral port.
    async fn fake_cluster() -> ClusterConfig {
        let app = Router::new()
            .route("/version", get(version))
            .route(
                "/api/v1/namespaces",
                get(|| async {
                    Json(json!({
                        "apiVersion": "v1", "kind": "NamespaceList", "metadata": {}, "items": null
                    }))
                }),
            )
            .route(
                "/api/v1/namespaces/ocopea/services",
                post(|| async {
                    failure(StatusCode::CONFLICT, "AlreadyExists", "services already exists")
                }),
            )
            .route(
                "/api/v1/namespaces/ocopea/services/{name}",
                get(service).delete(|| async {
                    failure(StatusCode::CONFLICT, "Conflict", "deletion in progress")
                }),
            )
            .route("/api/v1/namespaces/ocopea/pods", get(pods))
            .route(
                "/api/v1/namespaces/ocopea/pods/{name}",
                axum::routing::delete(|| async {
                    failure(StatusCode::NOT_FOUND, "NotFound", "pods not found")
                }),
            )
            .route("/api/v1/namespaces/ocopea/pods/{name}/log", get(pod_log))
            .route("/api/v1/namespaces/ocopea/events", get(events));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        ClusterConfig {
            url: format!("http://{addr}"),
            namespace: "ocopea".into(),
            ..Default::default()
        }
    }

    fn shop() -> Resource {
        Service {
            metadata: object_meta("shop"),
            ..Default::default()
        }
        .into()
    }

    #[test]
    fn selector_joins_every_label() {
        let selector = Labels::from([
            ("app".to_string(), "echo".to_string()),
            ("nazKind".to_string(), "app".to_string()),
        ]);
        assert_eq!(label_selector(&selector), "app=echo,nazKind=app");
        assert_eq!(
            list_params(&selector).label_selector.as_deref(),
            Some("app=echo,nazKind=app")
        );
        assert!(list_params(&Labels::new()).label_selector.is_none());
    }

    #[test]
    fn config_follows_cluster_section() {
        let cluster = ClusterConfig {
            url: "https://10.0.0.1:443".into(),
            namespace: "site".into(),
            username: Some("kube".into()),
            password: Some("pw".into()),
            insecure_skip_tls_verify: true,
            ..Default::default()
        };
        let config = KubeClient::config(&cluster).unwrap();
        assert_eq!(config.cluster_url.scheme_str(), Some("https"));
        assert_eq!(config.cluster_url.host(), Some("10.0.0.1"));
        assert_eq!(config.cluster_url.port_u16(), Some(443));
        assert_eq!(config.default_namespace, "site");
        assert!(config.accept_invalid_certs);
        assert!(config.read_timeout.is_none());
        assert_eq!(config.auth_info.username.as_deref(), Some("kube"));
    }

    #[test]
    fn bad_url_is_a_config_error() {
        let cluster = ClusterConfig {
            url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(KubeClient::config(&cluster), Err(ClientError::Config(_))));
    }

    #[tokio::test]
    async fn connect_fails_when_cluster_unreachable() {
        let cluster = ClusterConfig {
            url: "http://127.0.0.1:1".into(),
            ..Default::default()
        };
        let err = KubeClient::connect(&cluster).await.err().unwrap();
        assert!(err.is_transient(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn conflicting_create_adopts_only_when_forced() {
        let client = KubeClient::connect(&fake_cluster().await).await.unwrap();

        let err = client.create(shop(), false).await.unwrap_err();
        assert!(matches!(err, ClientError::Conflict { kind: ResourceKind::Service, .. }));

        let applied = client.create(shop(), true).await.unwrap();
        assert!(applied.is_adopted());
        let service = applied.into_inner().into_service().unwrap();
        assert_eq!(service.object_uid(), Some("svc-1"));
        assert_eq!(service.first_node_port(), Some(30080));
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() {
        let client = KubeClient::connect(&fake_cluster().await).await.unwrap();
        let err = client.get(ResourceKind::Service, "gone").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound { ref name, .. } if name == "gone"));

        let err = client.delete(ResourceKind::Pod, "gone").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound { kind: ResourceKind::Pod, .. }));

        // Deletion already in progress.
        client.delete(ResourceKind::Service, "shop").await.unwrap();
    }

    #[tokio::test]
    async fn list_sends_the_label_selector() {
        let client = KubeClient::connect(&fake_cluster().await).await.unwrap();
        let selector = Labels::from([("app".to_string(), "shop".to_string())]);
        let pods = client.list(ResourceKind::Pod, &selector).await.unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].name(), "app=shop");
    }

    #[tokio::test]
    async fn null_list_items_decode_as_empty() {
        let client = KubeClient::connect(&fake_cluster().await).await.unwrap();
        let namespaces = client.list(ResourceKind::Namespace, &Labels::new()).await.unwrap();
        assert!(namespaces.is_empty());
    }

    #[tokio::test]
    async fn events_are_selected_by_uid() {
        let client = KubeClient::connect(&fake_cluster().await).await.unwrap();
        let events = client.list_events("pod-uid-1").await.unwrap();
        assert_eq!(events[0].reason.as_deref(), Some("Pulling"));
        assert_eq!(events[0].message.as_deref(), Some("involvedObject.uid=pod-uid-1"));
    }

    #[tokio::test]
    async fn followed_log_yields_lines_until_closed() {
        let client = KubeClient::connect(&fake_cluster().await).await.unwrap();
        let (mut lines, close) = client.follow_log("shop-1").await.unwrap().into_parts();
        assert_eq!(lines.next().await.unwrap().unwrap(), "one");
        assert_eq!(lines.next().await.unwrap().unwrap(), "two");
        close.close();
        assert!(lines.next().await.is_none());
    }

    #[tokio::test]
    async fn waiting_container_log_is_a_status_error() {
        let client = KubeClient::connect(&fake_cluster().await).await.unwrap();
        let err = client.follow_log("shop-2").await.err().unwrap();
        assert!(matches!(err, ClientError::Status { status: 400, .. }));

        let err = client.follow_log("gone").await.err().unwrap();
        assert!(matches!(err, ClientError::NotFound { .. }));
    }
}
