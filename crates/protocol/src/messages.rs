use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::TransferRequest;

// ---------------------------------------------------------------------------
// Incoming job message
// ---------------------------------------------------------------------------

/// A transfer job as delivered by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferMessage {
    pub source: SourceSection,
    pub destination: DestinationSection,
    pub outcome: OutcomeSection,
}

/// Where the file is pulled from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSection {
    pub url: String,
    /// Extra request headers for the object store (typically `host`).
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<i64>,
}

/// Where the file must end up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationSection {
    /// Remote server that runs the fetch.
    pub host: String,
    /// Absolute path of the final file on `host`.
    pub path: String,
    /// Name of the SSH identity used to reach `host`.
    pub credentials: String,
}

/// Where the outcome event is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSection {
    pub topic: String,
}

impl TransferMessage {
    /// Builds the engine request carried by this message.
    pub fn to_request(&self) -> TransferRequest {
        TransferRequest {
            source_url: self.source.url.clone(),
            source_headers: self.source.headers.clone(),
            destination_path: self.destination.path.clone(),
            file_size_bytes: self.source.file_size_bytes,
        }
    }
}
