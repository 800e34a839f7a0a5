//! Access to the cluster's resource API.
//!
//! Everything above this crate talks to the cluster through the
//! [`ResourceClient`] trait, injected as `Arc<dyn ResourceClient>`.
//! [`KubeClient`] is the `kube`-backed implementation; with the `testkit`
//! feature, [`testkit::ScriptedClient`] provides an in-memory cluster for
//! tests.

pub mod client;
pub mod credentials;
pub mod error;
pub mod resource;
pub mod rest;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use client::{Applied, ClientFuture, CloseHandle, LineStream, LogFollower, ResourceClient};
pub use credentials::Credentials;
pub use error::{ClientError, ClientResult};
pub use resource::{Resource, ResourceKind};
pub use rest::KubeClient;
