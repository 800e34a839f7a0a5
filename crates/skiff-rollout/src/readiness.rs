//! Service readiness strategies, one per endpoint type.

use std::time::Duration;

use skiff_core::{EndpointType, Service, ServiceExt};

use crate::error::{RolloutError, RolloutResult};

/// How to tell that a service is reachable. Resolved once per wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// First load balancer ingress has an IP or hostname.
    Ingress,
    /// First port has a node port assigned.
    NodePort,
    /// Nothing observable; ready after a fixed delay.
    Grace(Duration),
}

impl Readiness {
    pub fn for_endpoint(
        endpoint_type: &EndpointType,
        service: &str,
        grace: Duration,
    ) -> RolloutResult<Self> {
        match endpoint_type {
            EndpointType::LoadBalanced => Ok(Readiness::Ingress),
            EndpointType::NodeExposed => Ok(Readiness::NodePort),
            EndpointType::ClusterLocal => Ok(Readiness::Grace(grace)),
            EndpointType::Other(other) => Err(RolloutError::UnsupportedEndpoint {
                service: service.to_string(),
                endpoint_type: other.clone(),
            }),
        }
    }

    pub fn is_ready(&self, service: &Service) -> bool {
        match self {
            Readiness::Ingress => service.ingress_address().is_some(),
            Readiness::NodePort => service.first_node_port().is_some(),
            Readiness::Grace(_) => true,
        }
    }

    pub fn grace(&self) -> Option<Duration> {
        match self {
            Readiness::Grace(d) => Some(*d),
            _ => None,
        }
    }
}
