//! Data types for the transfer flow.

use std::fmt;
use std::time::Duration;

use rangepull_protocol::TransferRequest;
use rangepull_transfer::{DEFAULT_PART_SIZE, Part, TempLayout};

use crate::error::TransferError;

/// Default interval between free-space observations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(120);

/// Engine configuration shared by every job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Size of every part but the last, in bytes.
    pub part_size_bytes: i64,
    /// Minimum free space (percent) before a job may start. `None` disables the gate.
    pub free_space_percentage_threshold: Option<u8>,
    /// Filesystem the threshold applies to. `None` disables the gate.
    pub free_space_filesystem: Option<String>,
    pub free_space_poll_interval: Duration,
    /// Maximum parts fetched at once. `None` fetches every part at once.
    pub part_fetch_concurrency_limit: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            part_size_bytes: DEFAULT_PART_SIZE,
            free_space_percentage_threshold: None,
            free_space_filesystem: None,
            free_space_poll_interval: DEFAULT_POLL_INTERVAL,
            part_fetch_concurrency_limit: None,
        }
    }
}

/// Lifecycle state of a [`TransferJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Created,
    SpaceCheckPending,
    Planning,
    Transferring,
    Assembling,
    Completed,
    Skipped,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Skipped | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Created, Skipped | SpaceCheckPending | Failed | Cancelled)
                | (SpaceCheckPending, Planning | Failed | Cancelled)
                | (Planning, Transferring | Failed | Cancelled)
                | (Transferring, Assembling | Failed | Cancelled)
                | (Assembling, Completed | Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Created => "created",
            JobStatus::SpaceCheckPending => "space_check_pending",
            JobStatus::Planning => "planning",
            JobStatus::Transferring => "transferring",
            JobStatus::Assembling => "assembling",
            JobStatus::Completed => "completed",
            JobStatus::Skipped => "skipped",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Result of fetching one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartOutcome {
    pub part_index: usize,
    pub success: bool,
    pub error: Option<String>,
}

impl PartOutcome {
    pub fn ok(part_index: usize) -> Self {
        Self {
            part_index,
            success: true,
            error: None,
        }
    }

    pub fn failed(part_index: usize, error: &TransferError) -> Self {
        Self {
            part_index,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// One transfer in progress. Owned and mutated by the orchestrator only.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub id: String,
    pub request: TransferRequest,
    pub status: JobStatus,
    pub parts: Vec<Part>,
    pub part_outcomes: Vec<PartOutcome>,
    layout: TempLayout,
    /// Set once the job asked the remote to create its temp directory.
    tmp_dir_requested: bool,
}

impl TransferJob {
    /// Creates a job with a fresh v4 id.
    pub fn new(request: TransferRequest) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), request)
    }

    pub fn with_id(id: impl Into<String>, request: TransferRequest) -> Self {
        let id = id.into();
        let layout = TempLayout::new(&request.destination_path, &id);
        Self {
            id,
            request,
            status: JobStatus::Created,
            parts: Vec::new(),
            part_outcomes: Vec::new(),
            layout,
            tmp_dir_requested: false,
        }
    }

    pub fn layout(&self) -> &TempLayout {
        &self.layout
    }

    pub fn tmp_dir_path(&self) -> &str {
        self.layout.tmp_dir()
    }

    pub fn tmp_dir_requested(&self) -> bool {
        self.tmp_dir_requested
    }

    pub(crate) fn mark_tmp_dir_requested(&mut self) {
        self.tmp_dir_requested = true;
    }
}

/// Final outcome of a job.
#[derive(Debug)]
pub enum TransferOutcome {
    /// Destination written; carries its size in bytes.
    Completed { size: u64 },
    /// Destination already existed; nothing was touched.
    Skipped,
    Failed(TransferError),
    Cancelled,
}

impl TransferOutcome {
    /// Terminal job status matching this outcome.
    pub fn status(&self) -> JobStatus {
        match self {
            TransferOutcome::Completed { .. } => JobStatus::Completed,
            TransferOutcome::Skipped => JobStatus::Skipped,
            TransferOutcome::Failed(_) => JobStatus::Failed,
            TransferOutcome::Cancelled => JobStatus::Cancelled,
        }
    }

    /// Whether the delivering queue should acknowledge the message.
    pub fn is_ack(&self) -> bool {
        matches!(
            self,
            TransferOutcome::Completed { .. } | TransferOutcome::Skipped
        )
    }
}

/// Event emitted while a job runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// The job moved to a new status.
    StatusChanged { job_id: String, status: JobStatus },
    /// A part finished fetching, successfully or not.
    PartFinished { job_id: String, outcome: PartOutcome },
}

/// A finished job and how it ended.
#[derive(Debug)]
pub struct JobReport {
    pub job: TransferJob,
    pub outcome: TransferOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.part_size_bytes, 256 * 1024 * 1024);
        assert_eq!(config.free_space_poll_interval, Duration::from_secs(120));
        assert!(config.free_space_percentage_threshold.is_none());
        assert!(config.part_fetch_concurrency_limit.is_none());
    }

    #[test]
    fn terminal_states_have_no_successor() {
        let all = [
            JobStatus::Created,
            JobStatus::SpaceCheckPending,
            JobStatus::Planning,
            JobStatus::Transferring,
            JobStatus::Assembling,
            JobStatus::Completed,
            JobStatus::Skipped,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            assert!(all.iter().all(|to| !from.can_transition_to(*to)), "{from}");
        }
    }

    #[test]
    fn assembling_cannot_be_cancelled() {
        assert!(JobStatus::Transferring.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Assembling.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Created.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn job_layout_uses_its_id() {
        let job = TransferJob::with_id("j1", TransferRequest::new("u", "/mnt/f.mxf", Some(1)));
        assert_eq!(job.tmp_dir_path(), "/mnt/.f.mxf.j1.part");
        assert_eq!(job.status, JobStatus::Created);
        assert!(!job.tmp_dir_requested());
    }

    #[test]
    fn fresh_ids_are_unique() {
        let a = TransferJob::new(TransferRequest::new("u", "/mnt/f", None));
        let b = TransferJob::new(TransferRequest::new("u", "/mnt/f", None));
        assert_ne!(a.id, b.id);
        assert_ne!(a.tmp_dir_path(), b.tmp_dir_path());
    }

    #[test]
    fn ack_only_for_completed_and_skipped() {
        assert!(TransferOutcome::Completed { size: 1 }.is_ack());
        assert!(TransferOutcome::Skipped.is_ack());
        assert!(!TransferOutcome::Cancelled.is_ack());
        assert!(!TransferOutcome::Failed(TransferError::Cancelled).is_ack());
    }
}
