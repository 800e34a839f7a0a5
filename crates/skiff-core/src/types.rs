//! Cluster object model shared across Skiff crates.
//!
//! Objects are the `k8s-openapi` v1 types. The extension traits here add
//! the few derived reads the rollout coordinator, the log relay and the
//! broker make over and over, so callers do not unwrap the same optional
//! fields in every module.

use std::collections::BTreeMap;
use std::fmt;

pub use k8s_openapi::api::core::v1::{
    Container, ContainerPort, ContainerState, ContainerStateTerminated, ContainerStateWaiting,
    ContainerStatus, EnvVar, Event, LoadBalancerIngress, LoadBalancerStatus, Namespace,
    NamespaceStatus, ObjectReference, Pod, PodSpec, PodStatus, PodTemplateSpec,
    ReplicationController, ReplicationControllerSpec, ReplicationControllerStatus, Service,
    ServicePort, ServiceSpec, ServiceStatus,
};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
pub use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use k8s_openapi::Metadata;

/// Label set used both as object labels and as a pod selector.
pub type Labels = BTreeMap<String, String>;

/// Metadata carrying only a name.
pub fn object_meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

pub fn new_namespace(name: &str) -> Namespace {
    Namespace {
        metadata: object_meta(name),
        ..Default::default()
    }
}

pub fn env_var(name: impl Into<String>, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        value_from: None,
    }
}

/// Reads shared by every object with standard metadata.
pub trait ObjectExt {
    /// Object name, empty when the server has not assigned one.
    fn name(&self) -> &str;

    fn object_uid(&self) -> Option<&str>;

    fn label(&self, key: &str) -> Option<&str>;
}

impl<K> ObjectExt for K
where
    K: Metadata<Ty = ObjectMeta>,
{
    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    fn object_uid(&self) -> Option<&str> {
        self.metadata().uid.as_deref().filter(|uid| !uid.is_empty())
    }

    fn label(&self, key: &str) -> Option<&str> {
        self.metadata().labels.as_ref()?.get(key).map(String::as_str)
    }
}

// ── Service ────────────────────────────────────────────────────

/// How a service is exposed, which also decides how its readiness is
/// observed.
///
/// Wire names are the cluster's (`ClusterIP`, `NodePort`, `LoadBalancer`).
/// Anything else is kept verbatim so callers can reject it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum EndpointType {
    #[default]
    ClusterLocal,
    NodeExposed,
    LoadBalanced,
    Other(String),
}

impl EndpointType {
    pub fn wire_name(&self) -> &str {
        match self {
            EndpointType::ClusterLocal => "ClusterIP",
            EndpointType::NodeExposed => "NodePort",
            EndpointType::LoadBalanced => "LoadBalancer",
            EndpointType::Other(s) => s,
        }
    }
}

impl From<&str> for EndpointType {
    fn from(s: &str) -> Self {
        match s {
            "ClusterIP" | "" => EndpointType::ClusterLocal,
            "NodePort" => EndpointType::NodeExposed,
            "LoadBalancer" => EndpointType::LoadBalanced,
            other => EndpointType::Other(other.to_string()),
        }
    }
}

impl From<String> for EndpointType {
    fn from(s: String) -> Self {
        EndpointType::from(s.as_str())
    }
}

impl From<EndpointType> for String {
    fn from(t: EndpointType) -> Self {
        t.wire_name().to_string()
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

pub trait ServiceExt {
    /// Exposure type; an unset type is cluster-local.
    fn endpoint_type(&self) -> EndpointType;

    fn ports(&self) -> &[ServicePort];

    fn cluster_ip(&self) -> Option<&str>;

    /// Node port assigned to the first declared port, if any.
    fn first_node_port(&self) -> Option<i32>;

    /// Address of the first load balancer ingress: IP preferred, then hostname.
    fn ingress_address(&self) -> Option<&str>;

    fn port_named(&self, name: &str) -> Option<&ServicePort>;
}

impl ServiceExt for Service {
    fn endpoint_type(&self) -> EndpointType {
        self.spec
            .as_ref()
            .and_then(|spec| spec.type_.as_deref())
            .map(EndpointType::from)
            .unwrap_or_default()
    }

    fn ports(&self) -> &[ServicePort] {
        self.spec
            .as_ref()
            .and_then(|spec| spec.ports.as_deref())
            .unwrap_or_default()
    }

    fn cluster_ip(&self) -> Option<&str> {
        self.spec
            .as_ref()?
            .cluster_ip
            .as_deref()
            .filter(|ip| !ip.is_empty() && *ip != "None")
    }

    fn first_node_port(&self) -> Option<i32> {
        self.ports().first().and_then(|p| p.node_port).filter(|p| *p > 0)
    }

    fn ingress_address(&self) -> Option<&str> {
        let ingress = self
            .status
            .as_ref()?
            .load_balancer
            .as_ref()?
            .ingress
            .as_ref()?
            .first()?;
        ingress
            .ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .or_else(|| ingress.hostname.as_deref().filter(|h| !h.is_empty()))
    }

    fn port_named(&self, name: &str) -> Option<&ServicePort> {
        self.ports().iter().find(|p| p.name.as_deref() == Some(name))
    }
}

// ── Replication controller ─────────────────────────────────────

pub trait ControllerExt {
    /// Replica count the cluster has observed so far (0 when no status yet).
    fn observed_replicas(&self) -> i32;

    fn selector(&self) -> Labels;
}

impl ControllerExt for ReplicationController {
    fn observed_replicas(&self) -> i32 {
        self.status.as_ref().map(|s| s.replicas).unwrap_or(0)
    }

    fn selector(&self) -> Labels {
        self.spec
            .as_ref()
            .and_then(|spec| spec.selector.clone())
            .unwrap_or_default()
    }
}

// ── Pod ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl From<&str> for PodPhase {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

pub trait PodExt {
    fn phase(&self) -> PodPhase;

    /// Status of the pod's first container; single-container pods are the
    /// only shape Skiff submits.
    fn main_container(&self) -> Option<&ContainerStatus>;
}

impl PodExt for Pod {
    fn phase(&self) -> PodPhase {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(PodPhase::from)
            .unwrap_or_default()
    }

    fn main_container(&self) -> Option<&ContainerStatus> {
        self.status.as_ref()?.container_statuses.as_ref()?.first()
    }
}

pub trait ContainerStatusExt {
    fn waiting(&self) -> Option<&ContainerStateWaiting>;

    fn terminated(&self) -> Option<&ContainerStateTerminated>;
}

impl ContainerStatusExt for ContainerStatus {
    fn waiting(&self) -> Option<&ContainerStateWaiting> {
        self.state.as_ref()?.waiting.as_ref()
    }

    fn terminated(&self) -> Option<&ContainerStateTerminated> {
        self.state.as_ref()?.terminated.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_type_wire_names() {
        let svc: Service = serde_json::from_str(
            r#"{"apiVersion":"v1","kind":"Service","metadata":{"name":"a"},"spec":{"type":"NodePort","ports":[{"port":80,"nodePort":31000}]}}"#,
        )
        .unwrap();
        assert_eq!(svc.endpoint_type(), EndpointType::NodeExposed);
        assert_eq!(svc.first_node_port(), Some(31000));
        assert_eq!(svc.name(), "a");

        assert_eq!(
            EndpointType::from("ExternalName"),
            EndpointType::Other("ExternalName".to_string())
        );
        assert_eq!(String::from(EndpointType::LoadBalanced), "LoadBalancer");
    }

    #[test]
    fn missing_type_defaults_to_cluster_local() {
        let svc: Service = serde_json::from_str(
            r#"{"apiVersion":"v1","kind":"Service","metadata":{"name":"a"},"spec":{}}"#,
        )
        .unwrap();
        assert_eq!(svc.endpoint_type(), EndpointType::ClusterLocal);
        assert!(svc.ports().is_empty());
        assert_eq!(Service::default().endpoint_type(), EndpointType::ClusterLocal);
    }

    #[test]
    fn headless_service_has_no_cluster_ip() {
        let svc: Service = serde_json::from_str(
            r#"{"kind":"Service","metadata":{"name":"a"},"spec":{"clusterIP":"None"}}"#,
        )
        .unwrap();
        assert_eq!(svc.cluster_ip(), None);
    }

    #[test]
    fn ingress_prefers_ip_then_hostname() {
        let mut svc = Service::default();
        assert_eq!(svc.ingress_address(), None);

        svc.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    ip: Some(String::new()),
                    hostname: Some("lb.example.com".to_string()),
                    ..Default::default()
                }]),
            }),
            ..Default::default()
        });
        assert_eq!(svc.ingress_address(), Some("lb.example.com"));
    }

    #[test]
    fn unknown_pod_phase_is_tolerated() {
        let pod: Pod = serde_json::from_str(
            r#"{"apiVersion":"v1","kind":"Pod","metadata":{"name":"p"},"status":{"phase":"Evicted"}}"#,
        )
        .unwrap();
        assert_eq!(pod.phase(), PodPhase::Unknown);
        assert_eq!(Pod::default().phase(), PodPhase::Unknown);
    }

    #[test]
    fn container_state_decodes() {
        let pod: Pod = serde_json::from_str(
            r#"{
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "p", "uid": "u-1", "labels": {"app": "p"}},
                "status": {
                    "phase": "Pending",
                    "containerStatuses": [{
                        "name": "c", "image": "repo/img", "imageID": "", "ready": false,
                        "restartCount": 0,
                        "state": {"waiting": {"reason": "ErrImagePull", "message": "not found"}}
                    }]
                }
            }"#,
        )
        .unwrap();
        let main = pod.main_container().unwrap();
        assert_eq!(main.waiting().unwrap().reason.as_deref(), Some("ErrImagePull"));
        assert!(main.terminated().is_none());
        assert_eq!(pod.object_uid(), Some("u-1"));
        assert_eq!(pod.label("app"), Some("p"));
        assert_eq!(pod.phase(), PodPhase::Pending);
    }

    #[test]
    fn controller_without_status_has_zero_replicas() {
        let rc: ReplicationController = serde_json::from_str(
            r#"{"apiVersion":"v1","kind":"ReplicationController","metadata":{"name":"rc"},"spec":{"selector":{"app":"rc"}}}"#,
        )
        .unwrap();
        assert_eq!(rc.observed_replicas(), 0);
        assert_eq!(rc.selector().get("app").map(String::as_str), Some("rc"));
    }

    #[test]
    fn unnamed_object_has_empty_name() {
        let ns = Namespace::default();
        assert_eq!(ns.name(), "");
        assert_eq!(ns.object_uid(), None);
        assert_eq!(new_namespace("ocopea").name(), "ocopea");
    }
}
