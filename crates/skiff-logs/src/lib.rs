//! Skiff log relay.
//!
//! A [`Session`] follows the logs of every pod labelled with one
//! application id and funnels their lines, tagged and timestamped, into a
//! single bounded queue. Followers of different pods fail independently.
//! Closing the session releases every open log connection exactly once.

pub mod config;
pub mod error;
pub mod message;
pub mod relay;
pub mod session;

pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use message::LogMessage;
pub use relay::LogRelay;
pub use session::Session;
