//! Transfer error types.

use rangepull_remote::RemoteError;
use rangepull_transfer::PlanError;

/// Errors that end a transfer job.
///
/// Everything except [`TransferError::CleanupFailed`] is terminal.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("target folder does not exist: {0}")]
    TargetFolderMissing(String),

    #[error("remote unavailable: {0}")]
    RemoteUnavailable(#[from] RemoteError),

    #[error("part {index} fetch failed: {reason}")]
    PartFetchFailed { index: usize, reason: String },

    #[error("part {index} has {actual} bytes, expected {expected}")]
    PartSizeMismatch {
        index: usize,
        expected: u64,
        actual: u64,
    },

    #[error("assembly failed: {0}")]
    AssemblyFailed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("cleanup of {path} failed: {reason}")]
    CleanupFailed { path: String, reason: String },
}

impl From<PlanError> for TransferError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::InvalidSize(msg) => TransferError::InvalidSize(msg),
            PlanError::InvalidPath(msg) => TransferError::InvalidRequest(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_errors_map_to_request_errors() {
        let err: TransferError = PlanError::InvalidSize("-1".into()).into();
        assert!(matches!(err, TransferError::InvalidSize(_)));
        let err: TransferError = PlanError::InvalidPath("rel".into()).into();
        assert!(matches!(err, TransferError::InvalidRequest(_)));
    }

    #[test]
    fn display_names_the_part() {
        let err = TransferError::PartSizeMismatch {
            index: 2,
            expected: 100,
            actual: 40,
        };
        assert_eq!(err.to_string(), "part 2 has 40 bytes, expected 100");
    }
}
