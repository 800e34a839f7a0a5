//! Skiff rollout coordinator.
//!
//! Drives a single workload from "submitted" to "observably ready" by
//! polling eventually-consistent cluster state under bounded retries.
//!
//! # Components
//!
//! - **`coordinator`**: create/adopt and the wait operations, composed into
//!   `deploy_and_wait` / `deploy_endpoint_and_wait`
//! - **`readiness`**: per-endpoint-type service readiness strategy
//! - **`retry`**: attempt counting and the generic polling loop
//! - **`state`**: the monotonic rollout state tracker
//! - **`namespace`**: namespace creation and delete-and-wait

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod namespace;
pub mod readiness;
pub mod retry;
pub mod state;

pub use config::RolloutConfig;
pub use coordinator::{Coordinator, Deployed};
pub use error::{ErrorClass, RolloutError, RolloutResult};
pub use readiness::Readiness;
pub use retry::{Attempts, Retryable, poll_until};
pub use state::{Rollout, RolloutState};
