pub mod config;
pub mod policy;
pub mod types;
pub mod workload;

pub use config::{
    BrokerConfig, ClusterConfig, ConfigError, DeploymentType, PolicyConfig, RelaySection,
    RolloutSection, SkiffConfig, duration_or, parse_duration, policy_or,
};
pub use policy::{PolicyError, RetryPolicy};
pub use types::*;
pub use workload::{APP_LABEL, EndpointSpec, MAIN_PORT_NAME, Workload};
