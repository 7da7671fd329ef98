//! Concurrent part fetch.
//!
//! Every part is pulled by the remote server straight from the source
//! into its temp path. At most `limit` fetches run at once. The first
//! failure stops new launches; fetches already running are drained and
//! their results discarded.

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use rangepull_remote::{RemoteSession, SourceSpec};
use rangepull_transfer::Part;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransferError;
use crate::types::PartOutcome;

/// Fetches the parts of one job.
pub struct PartFetchExecutor<'a> {
    session: &'a dyn RemoteSession,
    source: &'a SourceSpec,
    limit: usize,
}

impl<'a> PartFetchExecutor<'a> {
    /// `limit` is clamped to at least one.
    pub fn new(session: &'a dyn RemoteSession, source: &'a SourceSpec, limit: usize) -> Self {
        Self {
            session,
            source,
            limit: limit.max(1),
        }
    }

    /// Fetches all `parts`, recording one outcome per finished fetch.
    ///
    /// Succeeds only if every part landed at its temp path with exactly
    /// its planned size. Cancellation drops the in-flight fetches.
    pub async fn fetch_all(
        &self,
        parts: &[Part],
        cancel: &CancellationToken,
        outcomes: &mut Vec<PartOutcome>,
    ) -> Result<(), TransferError> {
        let mut pending = parts.iter();
        let mut in_flight = FuturesUnordered::new();
        let mut failure: Option<TransferError> = None;

        loop {
            while failure.is_none() && in_flight.len() < self.limit {
                match pending.next() {
                    Some(part) => in_flight.push(self.fetch_one(part)),
                    None => break,
                }
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                next = in_flight.next() => next,
            };
            let Some((index, result)) = next else {
                break;
            };

            match result {
                Ok(()) => outcomes.push(PartOutcome::ok(index)),
                Err(e) => {
                    warn!(part = index, error = %e, "part fetch failed");
                    outcomes.push(PartOutcome::failed(index, &e));
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn fetch_one(&self, part: &Part) -> (usize, Result<(), TransferError>) {
        (part.index, self.fetch_and_verify(part).await)
    }

    async fn fetch_and_verify(&self, part: &Part) -> Result<(), TransferError> {
        let index = part.index;
        let fetch_failed = |reason: String| TransferError::PartFetchFailed { index, reason };

        debug!(part = index, range = %part.range, dest = %part.temp_path, "fetching part");
        let status = self
            .session
            .fetch_range(self.source, part.range, &part.temp_path)
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;
        if !status.is_success() {
            return Err(fetch_failed(format!("HTTP status {}", status.http_status)));
        }

        let actual = self
            .session
            .stat_size(&part.temp_path)
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;
        if actual != part.range.len {
            return Err(TransferError::PartSizeMismatch {
                index,
                expected: part.range.len,
                actual,
            });
        }

        debug!(part = index, bytes = actual, "part fetched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rangepull_remote::{FetchFault, MemorySession, Op};
    use rangepull_transfer::{TempLayout, plan_parts};

    const URL: &str = "http://store/bucket/f.mxf";

    fn setup(size: usize, part_size: i64) -> (MemorySession, Vec<Part>) {
        let session = MemorySession::default();
        session.put_object(URL, (0..size).map(|i| i as u8).collect());
        let layout = TempLayout::new("/mnt/f.mxf", "j");
        session.add_dir(layout.tmp_dir());
        let parts = plan_parts(size as i64, part_size, &layout).unwrap();
        (session, parts)
    }

    #[tokio::test]
    async fn fetches_every_part() {
        let (session, parts) = setup(250, 100);
        let source = SourceSpec::new(URL);
        let mut outcomes = Vec::new();

        PartFetchExecutor::new(&session, &source, 8)
            .fetch_all(&parts, &CancellationToken::new(), &mut outcomes)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.success));
        for part in &parts {
            assert_eq!(
                session.file(&part.temp_path).unwrap().len() as u64,
                part.range.len
            );
        }
    }

    #[tokio::test]
    async fn http_error_fails_the_part() {
        let (session, parts) = setup(300, 100);
        session.fault_fetch(100, FetchFault::Status(403));
        let source = SourceSpec::new(URL);
        let mut outcomes = Vec::new();

        let err = PartFetchExecutor::new(&session, &source, 3)
            .fetch_all(&parts, &CancellationToken::new(), &mut outcomes)
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::PartFetchFailed { index: 1, .. }));
        let failed: Vec<_> = outcomes.iter().filter(|o| !o.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].part_index, 1);
    }

    #[tokio::test]
    async fn short_part_is_a_size_mismatch() {
        let (session, parts) = setup(300, 100);
        session.fault_fetch(200, FetchFault::ShortWrite(40));
        let source = SourceSpec::new(URL);

        let err = PartFetchExecutor::new(&session, &source, 3)
            .fetch_all(&parts, &CancellationToken::new(), &mut Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransferError::PartSizeMismatch {
                index: 2,
                expected: 100,
                actual: 40
            }
        ));
    }

    #[tokio::test]
    async fn transport_error_fails_the_part() {
        let (session, parts) = setup(100, 100);
        session.fault_fetch(0, FetchFault::Transport);
        let source = SourceSpec::new(URL);

        let err = PartFetchExecutor::new(&session, &source, 1)
            .fetch_all(&parts, &CancellationToken::new(), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::PartFetchFailed { index: 0, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let (session, parts) = setup(1000, 100);
        session.set_fetch_delay(Duration::from_secs(1));
        let source = SourceSpec::new(URL);

        PartFetchExecutor::new(&session, &source, 3)
            .fetch_all(&parts, &CancellationToken::new(), &mut Vec::new())
            .await
            .unwrap();

        assert_eq!(session.count(Op::Fetch), 10);
        assert_eq!(session.max_in_flight(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn no_launches_after_first_failure() {
        let (session, parts) = setup(1000, 100);
        session.set_fetch_delay(Duration::from_secs(1));
        session.fault_fetch(0, FetchFault::Status(500));
        let source = SourceSpec::new(URL);

        let mut outcomes = Vec::new();
        let result = PartFetchExecutor::new(&session, &source, 1)
            .fetch_all(&parts, &CancellationToken::new(), &mut outcomes)
            .await;

        assert!(result.is_err());
        assert_eq!(session.count(Op::Fetch), 1);
        assert_eq!(outcomes.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_parts_drain_after_failure() {
        let (session, parts) = setup(300, 100);
        session.set_fetch_delay(Duration::from_secs(1));
        session.fault_fetch(100, FetchFault::Status(404));
        let source = SourceSpec::new(URL);
        let mut outcomes = Vec::new();

        let result = PartFetchExecutor::new(&session, &source, 3)
            .fetch_all(&parts, &CancellationToken::new(), &mut outcomes)
            .await;

        assert!(result.is_err());
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().filter(|o| o.success).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_fetching() {
        let (session, parts) = setup(1000, 100);
        session.set_fetch_delay(Duration::from_secs(10));
        let source = SourceSpec::new(URL);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let err = PartFetchExecutor::new(&session, &source, 2)
            .fetch_all(&parts, &cancel, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
        assert_eq!(session.count(Op::Fetch), 2);
        assert!(session.file(&parts[0].temp_path).is_none());
    }
}
