use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::messages::TransferMessage;

/// One accepted transfer, as the engine sees it.
///
/// Immutable once the job starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source_url: String,
    #[serde(default)]
    pub source_headers: BTreeMap<String, String>,
    pub destination_path: String,
    /// Resolved remotely when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<i64>,
}

impl TransferRequest {
    /// Convenience constructor without headers.
    pub fn new(
        source_url: impl Into<String>,
        destination_path: impl Into<String>,
        file_size_bytes: Option<i64>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            source_headers: BTreeMap::new(),
            destination_path: destination_path.into(),
            file_size_bytes,
        }
    }
}

/// Outcome label carried by an [`OutcomeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventOutcome {
    Success,
    Fail,
    Skipped,
    Cancelled,
}

/// Event published once per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub message: String,
    pub outcome: EventOutcome,
    pub source: String,
    pub destination: String,
    pub host: String,
    pub topic: String,
    pub timestamp: String,
}

impl OutcomeEvent {
    /// Builds the event for `msg`, stamped with the current UTC time.
    pub fn new(msg: &TransferMessage, message: impl Into<String>, outcome: EventOutcome) -> Self {
        Self {
            message: message.into(),
            outcome,
            source: msg.source.url.clone(),
            destination: msg.destination.path.clone(),
            host: msg.destination.host.clone(),
            topic: msg.outcome.topic.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
