//! Broker API tests against an in-memory cluster.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use skiff_api::{ApiState, BrokerSettings, build_router};
use skiff_client::testkit::ScriptedClient;
use skiff_client::{Resource, ResourceKind};
use skiff_core::{
    DeploymentType, EndpointType, ObjectExt as _, Service, ServiceExt as _, ServicePort,
    ServiceSpec, new_namespace, object_meta,
};
use skiff_logs::{LogRelay, RelayConfig};
use skiff_rollout::{Coordinator, RolloutConfig};
use tower::ServiceExt;

fn settings() -> BrokerSettings {
    BrokerSettings {
        deployment_type: DeploymentType::Local,
        local_cluster_ip: Some("192.168.99.100".into()),
        in_cluster_address: None,
    }
}

fn router_with(client: &ScriptedClient, settings: BrokerSettings) -> Router {
    let shared: Arc<dyn skiff_client::ResourceClient> = Arc::new(client.clone());
    let coordinator = Coordinator::new(Arc::clone(&shared), RolloutConfig::default());
    let relay = LogRelay::new(shared, RelayConfig::default());
    build_router(ApiState::new(coordinator, relay, settings))
}

fn router(client: &ScriptedClient) -> Router {
    router_with(client, settings())
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn deploy_request(manifest: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/k8spsb-api/psb/app-services")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(manifest).unwrap()))
        .unwrap()
}

fn manifest(id: &str) -> Value {
    json!({
        "appServiceId": id,
        "space": "ocopea",
        "imageName": "acme/shop",
        "imageVersion": "1.2",
        "httpPort": 8080,
        "environmentVariables": {"DB_HOST": "${orders-db.host}"},
        "serviceBindings": {
            "mongo-k8s-dsb": [{
                "serviceName": "orders-db",
                "bindInfo": {"host": "10.0.0.12"}
            }]
        }
    })
}

fn node_port_service(name: &str, node_port: Option<i32>) -> Service {
    Service {
        metadata: object_meta(name),
        spec: Some(ServiceSpec {
            type_: Some(EndpointType::NodeExposed.into()),
            ports: Some(vec![ServicePort {
                name: Some("tcp".into()),
                port: 80,
                node_port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

#[tokio::test]
async fn info_and_state() {
    let client = ScriptedClient::new();
    let app = router(&client);

    let resp = app.clone().oneshot(get("/k8spsb-api/psb/info")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let info = body_json(resp).await;
    assert_eq!(info["name"], "k8s-mini");
    assert_eq!(info["type"], "k8s");
    assert_eq!(info["appServiceIdMaxLength"], 24);

    let resp = app.oneshot(get("/k8spsb-api/state")).await.unwrap();
    assert_eq!(body_json(resp).await, json!({"name": "k8spsb", "state": "RUNNING"}));
}

#[tokio::test]
async fn deploy_creates_controller_and_service() {
    let client = ScriptedClient::new();
    let resp = router(&client)
        .oneshot(deploy_request(&manifest("shop")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(body_json(resp).await["status"], 0);

    let created = client.created();
    assert_eq!(created.len(), 2);
    let Resource::ReplicationController(rc) = &created[0] else {
        panic!("expected a controller first, got {:?}", created[0].kind());
    };
    assert_eq!(rc.label("nazKind"), Some("app"));
    let pod_spec = rc
        .spec
        .as_ref()
        .and_then(|s| s.template.as_ref())
        .and_then(|t| t.spec.as_ref())
        .unwrap();
    let container = &pod_spec.containers[0];
    assert_eq!(container.image.as_deref(), Some("acme/shop:1.2"));
    let env = container.env.as_deref().unwrap();
    let db_host = env.iter().find(|e| e.name == "DB_HOST").unwrap();
    assert_eq!(db_host.value.as_deref(), Some("10.0.0.12"));
    assert!(env.iter().any(|e| e.name == "NAZ_MS_API_K8S_BINDINGS"));

    let Resource::Service(svc) = &created[1] else {
        panic!("expected a service second");
    };
    assert_eq!(svc.endpoint_type(), EndpointType::NodeExposed);
}

#[tokio::test]
async fn deploy_rejects_bad_manifests() {
    let client = ScriptedClient::new();
    let app = router(&client);

    let resp = app
        .clone()
        .oneshot(deploy_request(&manifest("an-app-service-id-that-is-too-long")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["status"], 1);

    let req = Request::builder()
        .method("POST")
        .uri("/k8spsb-api/psb/app-services")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(client.created().is_empty());
}

#[tokio::test]
async fn deploying_twice_conflicts() {
    let client = ScriptedClient::new();
    let app = router(&client);
    let first = app.clone().oneshot(deploy_request(&manifest("shop"))).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app.oneshot(deploy_request(&manifest("shop"))).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(second).await["status"], 1);
}

#[tokio::test]
async fn status_reports_progress() {
    let client = ScriptedClient::new();
    let app = router(&client);

    let resp = app
        .clone()
        .oneshot(get("/k8spsb-api/psb/app-services/ocopea/missing"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    client.insert(node_port_service("shop", None));
    let resp = app
        .clone()
        .oneshot(get("/k8spsb-api/psb/app-services/ocopea/shop"))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["status"], "starting");

    client.insert(node_port_service("shop", Some(30080)));
    let resp = app
        .oneshot(get("/k8spsb-api/psb/app-services/ocopea/shop"))
        .await
        .unwrap();
    let info = body_json(resp).await;
    assert_eq!(info["status"], "running");
    assert_eq!(info["instances"], 1);
    assert_eq!(info["entryPointURL"], "http://192.168.99.100:30080");
}

#[tokio::test]
async fn delete_removes_controller_and_service() {
    let client = ScriptedClient::new();
    let app = router(&client);
    app.clone().oneshot(deploy_request(&manifest("shop"))).await.unwrap();

    let req = Request::builder()
        .method("DELETE")
        .uri("/k8spsb-api/psb/app-services/ocopea/shop")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        client.deleted(),
        vec![
            (ResourceKind::ReplicationController, "shop".to_string()),
            (ResourceKind::Service, "shop".to_string()),
        ]
    );

    let req = Request::builder()
        .method("DELETE")
        .uri("/k8spsb-api/psb/app-services/ocopea/shop")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn spaces_are_namespaces() {
    let client = ScriptedClient::new();
    client.insert(new_namespace("ocopea"));
    client.insert(new_namespace("default"));

    let resp = router(&client).oneshot(get("/k8spsb-api/psb/spaces")).await.unwrap();
    let spaces = body_json(resp).await;
    assert_eq!(
        spaces,
        json!([
            {"name": "default", "properties": {}},
            {"name": "ocopea", "properties": {}}
        ])
    );
}

#[tokio::test]
async fn log_descriptor_prefers_in_cluster_address() {
    let client = ScriptedClient::new();
    let mut s = settings();
    s.in_cluster_address = Some("10.0.0.3:80".into());

    let resp = router_with(&client, s)
        .oneshot(get("/k8spsb-api/psb/app-services/ocopea/shop/logs"))
        .await
        .unwrap();
    let info = body_json(resp).await;
    assert_eq!(
        info["address"],
        "ws://10.0.0.3:80/k8spsb-api/psb/app-services/ocopea/shop/logs/data"
    );
    assert_eq!(info["serialization"], "json");

    let req = Request::builder()
        .uri("/k8spsb-api/psb/app-services/ocopea/shop/logs")
        .header("host", "broker.local:8080")
        .body(Body::empty())
        .unwrap();
    let resp = router(&client).oneshot(req).await.unwrap();
    assert_eq!(
        body_json(resp).await["address"],
        "ws://broker.local:8080/k8spsb-api/psb/app-services/ocopea/shop/logs/data"
    );
}
