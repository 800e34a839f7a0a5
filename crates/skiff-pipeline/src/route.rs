//! Routes derived from a ready service.
//!
//! Load-balanced services are addressed through their ingress; node-exposed
//! ones through the local cluster IP and the assigned node port. Anything
//! else has no external route.

use std::collections::BTreeMap;

use skiff_core::{
    EndpointType, EnvVar, MAIN_PORT_NAME, ObjectExt, Service, ServiceExt, ServicePort, env_var,
};

use crate::error::{PipelineError, PipelineResult};

pub const PUBLIC_ROUTE_ENV: &str = "NAZ_PUBLIC_ROUTE";
pub const PORTS_ENV: &str = "NAZ_PORTS";

fn route_error(service: &Service, reason: impl Into<String>) -> PipelineError {
    PipelineError::Route {
        service: service.name().to_string(),
        reason: reason.into(),
    }
}

fn ingress(service: &Service) -> PipelineResult<&str> {
    service
        .ingress_address()
        .ok_or_else(|| route_error(service, "load balancer has no ingress address"))
}

fn local_ip<'a>(service: &Service, cluster_ip: Option<&'a str>) -> PipelineResult<&'a str> {
    cluster_ip
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| route_error(service, "node port routes need a local cluster ip"))
}

/// Root URL of a public service, without a port for load balancers.
pub fn root_url(service: &Service, cluster_ip: Option<&str>) -> PipelineResult<String> {
    match service.endpoint_type() {
        EndpointType::LoadBalanced => Ok(format!("http://{}", ingress(service)?)),
        EndpointType::NodeExposed => {
            let ip = local_ip(service, cluster_ip)?;
            let port = service
                .first_node_port()
                .ok_or_else(|| route_error(service, "no node port assigned"))?;
            Ok(format!("http://{ip}:{port}"))
        }
        other => Err(route_error(
            service,
            format!("unsupported service type {other}"),
        )),
    }
}

/// Route of the service's main port. `None` for cluster-local services.
pub fn public_route(service: &Service, cluster_ip: Option<&str>) -> PipelineResult<Option<String>> {
    let main = service.port_named(MAIN_PORT_NAME);
    match service.endpoint_type() {
        EndpointType::LoadBalanced => {
            let port = main.ok_or_else(|| route_error(service, "failed assigning public port"))?;
            Ok(Some(format!("http://{}:{}", ingress(service)?, port.port)))
        }
        EndpointType::NodeExposed => {
            let node_port = main
                .and_then(|p| p.node_port)
                .filter(|p| *p > 0)
                .ok_or_else(|| route_error(service, "failed assigning node port"))?;
            Ok(Some(format!(
                "http://{}:{node_port}",
                local_ip(service, cluster_ip)?
            )))
        }
        _ => Ok(None),
    }
}

/// Externally mapped port of every non-main port, by port name.
pub fn additional_ports(service: &Service) -> BTreeMap<String, String> {
    let endpoint_type = service.endpoint_type();
    let mapped = |p: &ServicePort| match endpoint_type {
        EndpointType::LoadBalanced => Some(p.port),
        EndpointType::NodeExposed => p.node_port,
        _ => None,
    };
    service
        .ports()
        .iter()
        .filter_map(|p| {
            let name = p.name.as_deref()?;
            if name == MAIN_PORT_NAME {
                return None;
            }
            Some((name.to_string(), mapped(p)?.to_string()))
        })
        .collect()
}

/// Environment telling a container how it is reached from outside.
pub fn route_env(service: &Service, cluster_ip: Option<&str>) -> PipelineResult<Vec<EnvVar>> {
    let mut env = Vec::new();
    if let Some(route) = public_route(service, cluster_ip)? {
        env.push(env_var(PUBLIC_ROUTE_ENV, route));
    }
    let ports = additional_ports(service);
    if !ports.is_empty() {
        env.push(env_var(PORTS_ENV, serde_json::to_string(&ports)?));
    }
    Ok(env)
}
