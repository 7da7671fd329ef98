//! Job message and outcome event types shared by the rangepull engine and service.

pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use envelope::{MessageError, parse_job_message};
pub use messages::{DestinationSection, OutcomeSection, SourceSection, TransferMessage};
pub use types::{EventOutcome, OutcomeEvent, TransferRequest};
