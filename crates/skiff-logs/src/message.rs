//! The relayed log line.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Source tag of every relayed line; pod logs do not separate stderr.
pub const STDOUT: &str = "out";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub message: String,
    /// Milliseconds since the Unix epoch, taken when the relay read the line.
    pub timestamp: u64,
    #[serde(rename = "messageType")]
    pub source: String,
    #[serde(rename = "serviceId")]
    pub service_id: String,
}

impl LogMessage {
    pub fn out(message: String, service_id: &str) -> Self {
        Self {
            message,
            timestamp: now_millis(),
            source: STDOUT.to_string(),
            service_id: service_id.to_string(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
