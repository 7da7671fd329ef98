//! Transfer orchestrator.
//!
//! Drives one job through its lifecycle:
//!
//! ```text
//! Created -> SpaceCheckPending -> Planning -> Transferring -> Assembling -> Completed
//!    \-> Skipped          any step -> Failed | Cancelled
//! ```
//!
//! Every terminal path except Skipped removes the job's temp directory
//! before the outcome is returned.

use rangepull_protocol::TransferRequest;
use rangepull_remote::{RemoteSession, SourceSpec};
use rangepull_transfer::{plan_parts, validate_destination_path};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::assemble::Assembler;
use crate::cleanup::CleanupManager;
use crate::error::TransferError;
use crate::fetch::PartFetchExecutor;
use crate::gate::FreeSpaceGate;
use crate::guard::{GuardDecision, IdempotencyGuard};
use crate::types::{
    EngineConfig, JobEvent, JobReport, JobStatus, PartOutcome, TransferJob, TransferOutcome,
};

/// Runs transfer jobs against remote sessions.
///
/// One orchestrator serves any number of jobs; each job gets its own
/// [`TransferJob`] and cancellation token.
pub struct TransferOrchestrator {
    config: EngineConfig,
    gate: FreeSpaceGate,
    events_tx: mpsc::Sender<JobEvent>,
    events_rx: Option<mpsc::Receiver<JobEvent>>,
    cancel: CancellationToken,
}

impl Default for TransferOrchestrator {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl TransferOrchestrator {
    pub fn new(config: EngineConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            gate: FreeSpaceGate::from_config(&config),
            config,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Events are dropped when the receiver lags behind.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<JobEvent>> {
        self.events_rx.take()
    }

    /// Root token; cancelling it cancels every job started with [`run`](Self::run).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs `request` to completion under a child of the root token.
    pub async fn run(&self, session: &dyn RemoteSession, request: TransferRequest) -> JobReport {
        let mut job = TransferJob::new(request);
        let cancel = self.cancel.child_token();
        let outcome = self.run_job(session, &mut job, &cancel).await;
        JobReport { job, outcome }
    }

    /// Runs an already created job under `cancel`.
    pub async fn run_job(
        &self,
        session: &dyn RemoteSession,
        job: &mut TransferJob,
        cancel: &CancellationToken,
    ) -> TransferOutcome {
        info!(
            job = %job.id,
            host = %session.host(),
            source = %job.request.source_url,
            destination = %job.request.destination_path,
            "job started"
        );

        let outcome = match self.drive(session, job, cancel).await {
            Ok(outcome) => outcome,
            Err(TransferError::Cancelled) => TransferOutcome::Cancelled,
            Err(e) => TransferOutcome::Failed(e),
        };

        if !matches!(outcome, TransferOutcome::Skipped)
            && let Err(e) = CleanupManager::new(session).cleanup(job).await
        {
            warn!(job = %job.id, error = %e, "cleanup failed");
        }

        self.transition(job, outcome.status());
        match &outcome {
            TransferOutcome::Completed { size } => {
                info!(job = %job.id, bytes = size, "job completed");
            }
            TransferOutcome::Skipped => info!(job = %job.id, "job skipped"),
            TransferOutcome::Cancelled => info!(job = %job.id, "job cancelled"),
            TransferOutcome::Failed(e) => error!(job = %job.id, error = %e, "job failed"),
        }
        outcome
    }

    /// Non-terminal part of the lifecycle. Cleanup is left to the caller.
    async fn drive(
        &self,
        session: &dyn RemoteSession,
        job: &mut TransferJob,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome, TransferError> {
        let destination = job.request.destination_path.clone();
        validate_destination_path(&destination)?;
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        // Idempotency check happens before any mutation.
        if IdempotencyGuard::new(session).check(&destination).await? == GuardDecision::Skip {
            return Ok(TransferOutcome::Skipped);
        }

        self.transition(job, JobStatus::SpaceCheckPending);
        self.gate.admit(session, &destination, cancel).await?;

        self.transition(job, JobStatus::Planning);
        let source = SourceSpec {
            url: job.request.source_url.clone(),
            headers: job.request.source_headers.clone(),
        };
        let file_size = match job.request.file_size_bytes {
            Some(size) => size,
            None => self.probe_size(session, &source, cancel).await?,
        };
        job.parts = plan_parts(file_size, self.config.part_size_bytes, job.layout())?;
        info!(
            job = %job.id,
            bytes = file_size,
            parts = job.parts.len(),
            "transfer planned"
        );

        self.transition(job, JobStatus::Transferring);
        job.mark_tmp_dir_requested();
        session.mkdir(job.tmp_dir_path()).await?;

        let limit = self
            .config
            .part_fetch_concurrency_limit
            .unwrap_or(job.parts.len());
        let mut outcomes = Vec::with_capacity(job.parts.len());
        let fetched = PartFetchExecutor::new(session, &source, limit)
            .fetch_all(&job.parts, cancel, &mut outcomes)
            .await;
        self.record_parts(job, outcomes);
        fetched?;

        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        self.transition(job, JobStatus::Assembling);
        // Planning rejected negative sizes.
        let expected = file_size.unsigned_abs();
        let size = Assembler::new(session)
            .assemble(&job.parts, job.layout(), &destination, expected)
            .await?;
        Ok(TransferOutcome::Completed { size })
    }

    async fn probe_size(
        &self,
        session: &dyn RemoteSession,
        source: &SourceSpec,
        cancel: &CancellationToken,
    ) -> Result<i64, TransferError> {
        let size = tokio::select! {
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            size = session.source_size(source) => size?,
        };
        i64::try_from(size)
            .map_err(|_| TransferError::InvalidSize(format!("source too large: {size}")))
    }

    fn record_parts(&self, job: &mut TransferJob, outcomes: Vec<PartOutcome>) {
        for outcome in &outcomes {
            self.emit(JobEvent::PartFinished {
                job_id: job.id.clone(),
                outcome: outcome.clone(),
            });
        }
        job.part_outcomes = outcomes;
        job.part_outcomes.sort_by_key(|o| o.part_index);
    }

    fn transition(&self, job: &mut TransferJob, next: JobStatus) {
        if !job.status.can_transition_to(next) {
            warn!(job = %job.id, from = %job.status, to = %next, "unexpected status transition");
        }
        info!(job = %job.id, from = %job.status, to = %next, "status changed");
        job.status = next;
        self.emit(JobEvent::StatusChanged {
            job_id: job.id.clone(),
            status: next,
        });
    }

    fn emit(&self, event: JobEvent) {
        let _ = self.events_tx.try_send(event);
    }
}
