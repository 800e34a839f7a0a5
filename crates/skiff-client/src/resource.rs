//! Resource kinds and the tagged resource value passed through the client.

use std::fmt;

use skiff_core::{Namespace, ObjectExt, ObjectMeta, Pod, ReplicationController, Service};

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Namespace,
    ReplicationController,
    Service,
    Pod,
}

impl ResourceKind {
    /// Namespaces are cluster-scoped; everything else lives in one.
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::Namespace)
    }

    pub fn api_kind(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::ReplicationController => "ReplicationController",
            ResourceKind::Service => "Service",
            ResourceKind::Pod => "Pod",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Namespace => "namespace",
            ResourceKind::ReplicationController => "replication controller",
            ResourceKind::Service => "service",
            ResourceKind::Pod => "pod",
        };
        f.write_str(s)
    }
}

/// A cluster object of one of the supported kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Namespace(Namespace),
    ReplicationController(ReplicationController),
    Service(Service),
    Pod(Pod),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Namespace(_) => ResourceKind::Namespace,
            Resource::ReplicationController(_) => ResourceKind::ReplicationController,
            Resource::Service(_) => ResourceKind::Service,
            Resource::Pod(_) => ResourceKind::Pod,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Resource::Namespace(r) => &r.metadata,
            Resource::ReplicationController(r) => &r.metadata,
            Resource::Service(r) => &r.metadata,
            Resource::Pod(r) => &r.metadata,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Resource::Namespace(r) => r.name(),
            Resource::ReplicationController(r) => r.name(),
            Resource::Service(r) => r.name(),
            Resource::Pod(r) => r.name(),
        }
    }

    pub fn into_namespace(self) -> ClientResult<Namespace> {
        match self {
            Resource::Namespace(r) => Ok(r),
            other => Err(other.mismatch(ResourceKind::Namespace)),
        }
    }

    pub fn into_controller(self) -> ClientResult<ReplicationController> {
        match self {
            Resource::ReplicationController(r) => Ok(r),
            other => Err(other.mismatch(ResourceKind::ReplicationController)),
        }
    }

    pub fn into_service(self) -> ClientResult<Service> {
        match self {
            Resource::Service(r) => Ok(r),
            other => Err(other.mismatch(ResourceKind::Service)),
        }
    }

    pub fn into_pod(self) -> ClientResult<Pod> {
        match self {
            Resource::Pod(r) => Ok(r),
            other => Err(other.mismatch(ResourceKind::Pod)),
        }
    }

    fn mismatch(&self, expected: ResourceKind) -> ClientError {
        ClientError::Protocol(format!(
            "expected a {expected}, got {} {}",
            self.kind(),
            self.name()
        ))
    }
}

impl From<Namespace> for Resource {
    fn from(r: Namespace) -> Self {
        Resource::Namespace(r)
    }
}

impl From<ReplicationController> for Resource {
    fn from(r: ReplicationController) -> Self {
        Resource::ReplicationController(r)
    }
}

impl From<Service> for Resource {
    fn from(r: Service) -> Self {
        Resource::Service(r)
    }
}

impl From<Pod> for Resource {
    fn from(r: Pod) -> Self {
        Resource::Pod(r)
    }
}

#[cfg(test)]
mod tests {
    use skiff_core::new_namespace;

    use super::*;

    #[test]
    fn kind_follows_the_variant() {
        let ns = Resource::from(new_namespace("ocopea"));
        assert_eq!(ns.kind(), ResourceKind::Namespace);
        assert_eq!(ns.kind().api_kind(), "Namespace");
        assert!(!ns.kind().is_namespaced());
        assert_eq!(ns.name(), "ocopea");
        assert!(ResourceKind::Pod.is_namespaced());
    }

    #[test]
    fn wrong_kind_is_a_protocol_error() {
        let err = Resource::from(new_namespace("ns")).into_pod().unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
