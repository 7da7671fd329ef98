//! Queue front-end: wires job messages to the transfer engine.
//!
//! Reads one JSON job message per line, runs each valid one as its own
//! task (bounded by `max_concurrent_jobs`), decides ack or dead-letter
//! from the outcome and writes one outcome event per job as a JSON line.

use std::path::PathBuf;
use std::sync::Arc;

use rangepull_engine::{TransferOrchestrator, TransferOutcome};
use rangepull_protocol::{EventOutcome, OutcomeEvent, TransferMessage, parse_job_message};
use rangepull_remote::{RemoteSession, SshSession};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, SshSection};

/// Opens the remote session a message's job runs on.
pub trait SessionFactory: Send + Sync + 'static {
    fn connect(&self, msg: &TransferMessage) -> anyhow::Result<Arc<dyn RemoteSession>>;
}

/// Opens an [`SshSession`] per message from the `[ssh]` settings.
pub struct SshSessionFactory {
    ssh: SshSection,
}

impl SshSessionFactory {
    pub fn new(ssh: SshSection) -> Self {
        Self { ssh }
    }
}

impl SessionFactory for SshSessionFactory {
    fn connect(&self, msg: &TransferMessage) -> anyhow::Result<Arc<dyn RemoteSession>> {
        let target = self
            .ssh
            .target_for(&msg.destination.host, &msg.destination.credentials)?;
        Ok(Arc::new(SshSession::new(target, self.ssh.command_timeout())))
    }
}

/// Counters reported when the front-end stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    pub acked: usize,
    pub dead_lettered: usize,
}

/// Runs the service until the input ends or Ctrl-C is pressed.
pub async fn run(config: Config, input: Option<PathBuf>) -> anyhow::Result<()> {
    let orchestrator = Arc::new(TransferOrchestrator::new(config.engine.to_engine_config()));
    let shutdown = orchestrator.cancel_token();
    let sessions: Arc<dyn SessionFactory> = Arc::new(SshSessionFactory::new(config.ssh));

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("SIGINT received, shutting down");
            signal.cancel();
        }
    });

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match input {
        Some(path) => {
            tracing::info!(path = %path.display(), "reading job messages from file");
            Box::new(BufReader::new(tokio::fs::File::open(&path).await?))
        }
        None => {
            tracing::info!("reading job messages from stdin");
            Box::new(BufReader::new(tokio::io::stdin()))
        }
    };

    let stats = serve(
        orchestrator,
        sessions,
        config.service.max_concurrent_jobs,
        reader,
        tokio::io::stdout(),
        shutdown,
    )
    .await?;

    tracing::info!(
        acked = stats.acked,
        dead_lettered = stats.dead_lettered,
        "input drained"
    );
    Ok(())
}

/// Consumes `input` until EOF or `shutdown`, then waits for running jobs.
///
/// `shutdown` should be the orchestrator's root token so that stopping
/// also cancels the jobs still waiting or fetching.
pub async fn serve<R, W>(
    orchestrator: Arc<TransferOrchestrator>,
    sessions: Arc<dyn SessionFactory>,
    max_jobs: usize,
    input: R,
    mut output: W,
    shutdown: CancellationToken,
) -> anyhow::Result<ServeStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let max_jobs = max_jobs.max(1);
    let mut lines = input.lines();
    let mut jobs: JoinSet<OutcomeEvent> = JoinSet::new();
    let mut stats = ServeStats::default();
    let mut reading = true;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled(), if reading => {
                tracing::info!(running = jobs.len(), "stopping consumption");
                reading = false;
            }
            Some(joined) = jobs.join_next(), if !jobs.is_empty() => {
                match joined {
                    Ok(event) => {
                        if is_ack(event.outcome) {
                            stats.acked += 1;
                        } else {
                            stats.dead_lettered += 1;
                        }
                        write_event(&mut output, &event).await?;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "job task failed");
                        stats.dead_lettered += 1;
                    }
                }
            }
            line = lines.next_line(), if reading && jobs.len() < max_jobs => {
                let Some(line) = line? else {
                    tracing::debug!("end of input");
                    reading = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_job_message(line.as_bytes()) {
                    Ok(msg) => {
                        jobs.spawn(process_message(
                            Arc::clone(&orchestrator),
                            Arc::clone(&sessions),
                            msg,
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "dead-lettering invalid message");
                        stats.dead_lettered += 1;
                    }
                }
            }
            else => break,
        }
    }

    output.flush().await?;
    Ok(stats)
}

/// Runs one job and builds its outcome event.
async fn process_message(
    orchestrator: Arc<TransferOrchestrator>,
    sessions: Arc<dyn SessionFactory>,
    msg: TransferMessage,
) -> OutcomeEvent {
    let session = match sessions.connect(&msg) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(host = %msg.destination.host, error = %e, "dead-lettering job");
            return OutcomeEvent::new(&msg, e.to_string(), EventOutcome::Fail);
        }
    };

    let report = orchestrator.run(session.as_ref(), msg.to_request()).await;
    let (outcome, text) = describe(&report.outcome);
    if report.outcome.is_ack() {
        tracing::info!(job = %report.job.id, outcome = ?outcome, "acking message");
    } else {
        tracing::warn!(job = %report.job.id, outcome = ?outcome, "dead-lettering message");
    }
    OutcomeEvent::new(&msg, text, outcome)
}

/// Event label and human-readable message for an outcome.
pub fn describe(outcome: &TransferOutcome) -> (EventOutcome, String) {
    match outcome {
        TransferOutcome::Completed { size } => (
            EventOutcome::Success,
            format!("Transfer completed ({size} bytes)"),
        ),
        TransferOutcome::Skipped => (
            EventOutcome::Skipped,
            "Destination already exists".to_string(),
        ),
        TransferOutcome::Failed(e) => (EventOutcome::Fail, format!("Transfer failed: {e}")),
        TransferOutcome::Cancelled => (EventOutcome::Cancelled, "Transfer cancelled".to_string()),
    }
}

fn is_ack(outcome: EventOutcome) -> bool {
    matches!(outcome, EventOutcome::Success | EventOutcome::Skipped)
}

async fn write_event<W: AsyncWrite + Unpin>(
    output: &mut W,
    event: &OutcomeEvent,
) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangepull_engine::{EngineConfig, TransferError};
    use rangepull_remote::MemorySession;

    const URL: &str = "http://store/bucket/f.mxf";

    struct MemoryFactory(Arc<MemorySession>);

    impl SessionFactory for MemoryFactory {
        fn connect(&self, msg: &TransferMessage) -> anyhow::Result<Arc<dyn RemoteSession>> {
            if msg.destination.host == "unreachable" {
                anyhow::bail!("no route to {}", msg.destination.host);
            }
            Ok(self.0.clone())
        }
    }

    fn message(path: &str, host: &str) -> String {
        serde_json::json!({
            "source": {"url": URL, "headers": {"host": "bucket"}, "file_size_bytes": 250},
            "destination": {"host": host, "path": path, "credentials": "ingest"},
            "outcome": {"topic": "transfers"}
        })
        .to_string()
    }

    fn session() -> Arc<MemorySession> {
        let session = MemorySession::new("ingest-01");
        session.put_object(URL, vec![7; 250]);
        session.add_dir("/mnt/ingest");
        Arc::new(session)
    }

    async fn serve_lines(
        session: Arc<MemorySession>,
        input: String,
        max_jobs: usize,
    ) -> (ServeStats, Vec<OutcomeEvent>) {
        let orchestrator = Arc::new(TransferOrchestrator::new(EngineConfig {
            part_size_bytes: 100,
            ..EngineConfig::default()
        }));
        let shutdown = orchestrator.cancel_token();
        let mut output = Vec::new();
        let stats = serve(
            orchestrator,
            Arc::new(MemoryFactory(session)),
            max_jobs,
            input.as_bytes(),
            &mut output,
            shutdown,
        )
        .await
        .unwrap();
        let events = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (stats, events)
    }

    #[tokio::test]
    async fn completed_job_is_acked() {
        let session = session();
        let input = message("/mnt/ingest/a.mxf", "ingest-01");

        let (stats, events) = serve_lines(session.clone(), input, 2).await;

        assert_eq!(stats, ServeStats { acked: 1, dead_lettered: 0 });
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, EventOutcome::Success);
        assert_eq!(events[0].topic, "transfers");
        assert_eq!(events[0].destination, "/mnt/ingest/a.mxf");
        assert_eq!(session.file("/mnt/ingest/a.mxf").unwrap().len(), 250);
    }

    #[tokio::test]
    async fn invalid_messages_are_dead_lettered() {
        let input = format!(
            "{}\nnot json\n{{\"source\": {{}}}}\n",
            message("/mnt/ingest/a.mxf", "ingest-01")
        );

        let (stats, events) = serve_lines(session(), input, 2).await;

        assert_eq!(stats, ServeStats { acked: 1, dead_lettered: 2 });
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn existing_destination_is_skipped_and_acked() {
        let session = session();
        session.put_file("/mnt/ingest/a.mxf", vec![1]);

        let (stats, events) =
            serve_lines(session, message("/mnt/ingest/a.mxf", "ingest-01"), 1).await;

        assert_eq!(stats.acked, 1);
        assert_eq!(events[0].outcome, EventOutcome::Skipped);
    }

    #[tokio::test]
    async fn failures_are_dead_lettered_with_event() {
        let input = [
            message("/missing/a.mxf", "ingest-01"),
            message("/mnt/ingest/b.mxf", "unreachable"),
        ]
        .join("\n");

        let (stats, events) = serve_lines(session(), input, 1).await;

        assert_eq!(stats, ServeStats { acked: 0, dead_lettered: 2 });
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.outcome == EventOutcome::Fail));
    }

    #[tokio::test]
    async fn many_jobs_with_small_limit() {
        let input = (0..5)
            .map(|i| message(&format!("/mnt/ingest/{i}.mxf"), "ingest-01"))
            .collect::<Vec<_>>()
            .join("\n");

        let (stats, events) = serve_lines(session(), input, 2).await;

        assert_eq!(stats.acked, 5);
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn shutdown_stops_consumption() {
        let orchestrator = Arc::new(TransferOrchestrator::default());
        let shutdown = orchestrator.cancel_token();
        shutdown.cancel();
        let mut output = Vec::new();

        let stats = serve(
            orchestrator,
            Arc::new(MemoryFactory(session())),
            1,
            message("/mnt/ingest/a.mxf", "ingest-01").as_bytes(),
            &mut output,
            shutdown,
        )
        .await
        .unwrap();

        assert_eq!(stats, ServeStats::default());
        assert!(output.is_empty());
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(
            describe(&TransferOutcome::Completed { size: 3 }).0,
            EventOutcome::Success
        );
        assert_eq!(describe(&TransferOutcome::Skipped).0, EventOutcome::Skipped);
        assert_eq!(describe(&TransferOutcome::Cancelled).0, EventOutcome::Cancelled);
        let (label, text) = describe(&TransferOutcome::Failed(TransferError::InvalidSize(
            "-1".into(),
        )));
        assert_eq!(label, EventOutcome::Fail);
        assert!(text.contains("invalid size"));
    }
}
