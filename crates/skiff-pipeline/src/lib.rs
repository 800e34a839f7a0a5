//! Skiff deployment pipeline.
//!
//! Rolls out a complete site in dependency order: namespace, datastore,
//! orchestrator (and its hosted services), brokers, then registers the
//! brokers with the orchestrator. Each step stops the pipeline on its first
//! failure; nothing is rolled back.
//!
//! # Components
//!
//! - **`pipeline`**: the step sequence and the standalone broker deployments
//! - **`route`**: externally reachable URLs derived from a ready service
//! - **`orchestrator`**: the orchestrator's command API
//! - **`settings`**: the orchestrator's static configuration document
//! - **`transport`**: basic-auth JSON requests to the orchestrator

pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod route;
pub mod settings;
pub mod transport;

pub use error::{PipelineError, PipelineResult};
pub use orchestrator::{HttpOrchestrator, Orchestrator, OrchestratorFuture, Site};
pub use pipeline::{DeployContext, Pipeline, SiteDeployment, SiteOptions};
pub use route::{additional_ports, public_route, root_url, route_env};
pub use settings::OrchestratorSettings;
