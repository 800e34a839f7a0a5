//! Workload definitions: what a single rollout submits.
//!
//! A [`Workload`] is the compute unit plus, optionally, the network
//! endpoint in front of it. It renders into the two cluster objects the
//! coordinator creates: a replication controller and a service.

use crate::types::{
    Container, ContainerPort, EndpointType, EnvVar, IntOrString, Labels, ObjectMeta, PodSpec,
    PodTemplateSpec, ReplicationController, ReplicationControllerSpec, Service, ServicePort,
    ServiceSpec, env_var, object_meta,
};

/// Name given to the main port of every endpoint unless overridden.
pub const MAIN_PORT_NAME: &str = "service-http";

/// Label key binding pods to their controller and service.
pub const APP_LABEL: &str = "app";

/// Network endpoint fronting a workload.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSpec {
    pub endpoint_type: EndpointType,
    pub port: i32,
    pub target_port: i32,
    pub port_name: String,
    pub additional_ports: Vec<ServicePort>,
}

impl EndpointSpec {
    pub fn new(endpoint_type: EndpointType, port: i32, target_port: i32) -> Self {
        Self {
            endpoint_type,
            port,
            target_port,
            port_name: MAIN_PORT_NAME.to_string(),
            additional_ports: Vec::new(),
        }
    }

    pub fn with_port_name(mut self, name: &str) -> Self {
        self.port_name = name.to_string();
        self
    }

    /// Expose an extra named port; its target is also declared on the container.
    pub fn with_additional_port(mut self, name: &str, port: i32, target_port: i32) -> Self {
        self.additional_ports.push(ServicePort {
            name: Some(name.to_string()),
            protocol: Some("TCP".to_string()),
            port,
            target_port: Some(IntOrString::Int(target_port)),
            ..Default::default()
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
    pub name: String,
    pub image: String,
    pub replicas: i32,
    pub env: Vec<EnvVar>,
    pub container_ports: Vec<i32>,
    /// Extra labels placed on the controller and its pods.
    pub labels: Labels,
    pub image_pull_policy: Option<String>,
    pub endpoint: Option<EndpointSpec>,
}

impl Workload {
    pub fn new(name: &str, image: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            replicas: 1,
            env: Vec::new(),
            container_ports: Vec::new(),
            labels: Labels::new(),
            image_pull_policy: None,
            endpoint: None,
        }
    }

    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.push(env_var(name, value));
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_container_port(mut self, port: i32) -> Self {
        self.container_ports.push(port);
        self
    }

    pub fn with_pull_policy(mut self, policy: &str) -> Self {
        self.image_pull_policy = Some(policy.to_string());
        self
    }

    pub fn with_endpoint(mut self, endpoint: EndpointSpec) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Pod selector: `{app: name}`.
    pub fn selector(&self) -> Labels {
        Labels::from([(APP_LABEL.to_string(), self.name.clone())])
    }

    /// Render the replication controller definition.
    pub fn controller(&self) -> ReplicationController {
        let mut pod_labels = self.selector();
        pod_labels.extend(self.labels.clone());

        let mut ports: Vec<ContainerPort> = self
            .container_ports
            .iter()
            .map(|p| ContainerPort {
                container_port: *p,
                ..Default::default()
            })
            .collect();
        if let Some(endpoint) = &self.endpoint {
            for extra in &endpoint.additional_ports {
                if let Some(IntOrString::Int(target)) = extra.target_port {
                    ports.push(ContainerPort {
                        container_port: target,
                        ..Default::default()
                    });
                }
            }
        }

        let labels = (!self.labels.is_empty()).then(|| self.labels.clone());
        ReplicationController {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                labels,
                ..Default::default()
            },
            spec: Some(ReplicationControllerSpec {
                replicas: Some(self.replicas),
                selector: Some(self.selector()),
                template: Some(PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(pod_labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: self.name.clone(),
                            image: Some(self.image.clone()),
                            image_pull_policy: self.image_pull_policy.clone(),
                            ports: (!ports.is_empty()).then_some(ports),
                            env: (!self.env.is_empty()).then(|| self.env.clone()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            }),
            status: None,
        }
    }

    /// Render the service definition, if this workload has an endpoint.
    pub fn service(&self) -> Option<Service> {
        let endpoint = self.endpoint.as_ref()?;
        let mut ports = vec![ServicePort {
            name: Some(endpoint.port_name.clone()),
            protocol: Some("TCP".to_string()),
            port: endpoint.port,
            target_port: Some(IntOrString::Int(endpoint.target_port)),
            ..Default::default()
        }];
        ports.extend(endpoint.additional_ports.iter().cloned());

        Some(Service {
            metadata: object_meta(&self.name),
            spec: Some(ServiceSpec {
                type_: Some(endpoint.endpoint_type.wire_name().to_string()),
                ports: Some(ports),
                selector: Some(self.selector()),
                ..Default::default()
            }),
            status: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ControllerExt, ObjectExt, ServiceExt};

    fn container(rc: &ReplicationController) -> &Container {
        &rc.spec.as_ref().unwrap().template.as_ref().unwrap().spec.as_ref().unwrap().containers[0]
    }

    #[test]
    fn controller_carries_selector_and_labels() {
        let rc = Workload::new("echo", "repo/echo:1")
            .with_label("nazKind", "app")
            .with_container_port(8080)
            .with_env("A", "1")
            .controller();

        assert_eq!(rc.name(), "echo");
        assert_eq!(rc.spec.as_ref().unwrap().replicas, Some(1));
        assert_eq!(rc.selector().get("app").map(String::as_str), Some("echo"));
        assert_eq!(rc.label("nazKind"), Some("app"));

        let template = rc.spec.as_ref().unwrap().template.as_ref().unwrap();
        let pod_labels = template.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        assert_eq!(pod_labels.len(), 2);
        let container = container(&rc);
        assert_eq!(container.image.as_deref(), Some("repo/echo:1"));
        assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 8080);
        assert_eq!(container.env, Some(vec![env_var("A", "1")]));
    }

    #[test]
    fn service_main_port_comes_first() {
        let svc = Workload::new("orcs", "img")
            .with_endpoint(
                EndpointSpec::new(EndpointType::NodeExposed, 80, 8080)
                    .with_additional_port("debug", 5005, 5005),
            )
            .service()
            .unwrap();

        assert_eq!(svc.endpoint_type(), EndpointType::NodeExposed);
        assert_eq!(svc.ports().len(), 2);
        assert_eq!(svc.ports()[0].name.as_deref(), Some(MAIN_PORT_NAME));
        assert_eq!(svc.ports()[0].target_port, Some(IntOrString::Int(8080)));
        let selector = svc.spec.as_ref().unwrap().selector.as_ref().unwrap();
        assert_eq!(selector.get("app").map(String::as_str), Some("orcs"));
    }

    #[test]
    fn additional_ports_are_declared_on_container() {
        let rc = Workload::new("orcs", "img")
            .with_container_port(8080)
            .with_endpoint(
                EndpointSpec::new(EndpointType::LoadBalanced, 80, 8080)
                    .with_additional_port("debug", 5005, 5006),
            )
            .controller();
        let ports: Vec<i32> = container(&rc)
            .ports
            .iter()
            .flatten()
            .map(|p| p.container_port)
            .collect();
        assert_eq!(ports, vec![8080, 5006]);
    }

    #[test]
    fn bare_workload_leaves_optional_fields_unset() {
        let rc = Workload::new("job", "img").controller();
        assert!(rc.metadata.labels.is_none());
        let container = container(&rc);
        assert!(container.ports.is_none());
        assert!(container.env.is_none());
        let json = serde_json::to_value(&rc).unwrap();
        assert_eq!(json["kind"], "ReplicationController");
        assert_eq!(json["apiVersion"], "v1");
    }

    #[test]
    fn no_endpoint_no_service() {
        assert!(Workload::new("job", "img").service().is_none());
    }
}
