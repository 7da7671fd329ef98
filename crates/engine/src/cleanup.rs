//! Temp artifact removal.

use rangepull_remote::RemoteSession;
use tracing::{debug, info};

use crate::error::TransferError;
use crate::types::TransferJob;

/// Removes a job's temp directory once the job is over.
pub struct CleanupManager<'a> {
    session: &'a dyn RemoteSession,
}

impl<'a> CleanupManager<'a> {
    pub fn new(session: &'a dyn RemoteSession) -> Self {
        Self { session }
    }

    /// Removes the temp directory of `job` and everything inside it.
    ///
    /// A job that never requested its temp directory has nothing to
    /// remove and causes no remote call. Failures come back as
    /// [`TransferError::CleanupFailed`] for the caller to log.
    pub async fn cleanup(&self, job: &TransferJob) -> Result<(), TransferError> {
        if !job.tmp_dir_requested() {
            debug!(job = %job.id, "no temp directory to remove");
            return Ok(());
        }

        let path = job.tmp_dir_path();
        self.session
            .remove_recursive(path)
            .await
            .map_err(|e| TransferError::CleanupFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        info!(job = %job.id, path = %path, "temp directory removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangepull_protocol::TransferRequest;
    use rangepull_remote::{MemorySession, Op};

    fn job() -> TransferJob {
        TransferJob::with_id("j", TransferRequest::new("u", "/mnt/f.mxf", Some(1)))
    }

    #[tokio::test]
    async fn noop_without_temp_dir() {
        let session = MemorySession::default();
        CleanupManager::new(&session).cleanup(&job()).await.unwrap();
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn removes_temp_dir_recursively() {
        let session = MemorySession::default();
        let mut job = job();
        job.mark_tmp_dir_requested();
        session.put_file(&job.layout().part_path(0), vec![1]);
        session.put_file(&job.layout().assembled_path(), vec![1]);

        CleanupManager::new(&session).cleanup(&job).await.unwrap();
        assert!(session.entries_under(job.tmp_dir_path()).is_empty());
        assert!(session.has_dir("/mnt"));
    }

    #[tokio::test]
    async fn failure_is_reported() {
        let session = MemorySession::default();
        session.fail_on(Op::Remove);
        let mut job = job();
        job.mark_tmp_dir_requested();
        let err = CleanupManager::new(&session).cleanup(&job).await.unwrap_err();
        assert!(matches!(err, TransferError::CleanupFailed { .. }));
    }
}
