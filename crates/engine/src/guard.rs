//! Destination pre-check, run before any remote mutation.

use rangepull_remote::RemoteSession;
use rangepull_transfer::split_destination;
use tracing::{debug, info};

use crate::error::TransferError;

/// What the guard decided for a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    /// The destination already exists.
    Skip,
}

/// Checks that a job may write `destination`.
///
/// Only queries the remote. Returns [`GuardDecision::Skip`] when the
/// destination already exists, and `TargetFolderMissing` when its parent
/// directory does not.
pub struct IdempotencyGuard<'a> {
    session: &'a dyn RemoteSession,
}

impl<'a> IdempotencyGuard<'a> {
    pub fn new(session: &'a dyn RemoteSession) -> Self {
        Self { session }
    }

    pub async fn check(&self, destination: &str) -> Result<GuardDecision, TransferError> {
        if self.session.exists(destination).await? {
            info!(destination = %destination, "destination exists, skipping");
            return Ok(GuardDecision::Skip);
        }

        let (parent, _) = split_destination(destination);
        if !self.session.exists(parent).await? {
            return Err(TransferError::TargetFolderMissing(parent.to_string()));
        }

        debug!(destination = %destination, "destination free");
        Ok(GuardDecision::Proceed)
    }
}
