//! Free-space backpressure gate.
//!
//! Holds a job back until the filesystem it writes to has enough free
//! space. The wait has no deadline: a full disk delays jobs, it never
//! fails them. Only cancellation ends the wait early.

use std::time::Duration;

use rangepull_remote::RemoteSession;
use rangepull_transfer::split_destination;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::TransferError;
use crate::types::EngineConfig;

/// Admission gate for one engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeSpaceGate {
    threshold: Option<u8>,
    filesystem: Option<String>,
    poll_interval: Duration,
}

impl FreeSpaceGate {
    pub fn new(threshold: Option<u8>, filesystem: Option<String>, poll_interval: Duration) -> Self {
        Self {
            threshold,
            filesystem,
            poll_interval,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.free_space_percentage_threshold,
            config.free_space_filesystem.clone(),
            config.free_space_poll_interval,
        )
    }

    /// The gate only applies when both threshold and filesystem are set.
    pub fn is_enabled(&self) -> bool {
        self.threshold.is_some() && self.filesystem.is_some()
    }

    /// Suspends until `destination` may be written.
    ///
    /// The mount is resolved from the destination's folder, since the
    /// destination itself does not exist yet. Returns `Err(Cancelled)` if
    /// `cancel` fires first. Remote errors while observing are fatal.
    pub async fn admit(
        &self,
        session: &dyn RemoteSession,
        destination: &str,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let (Some(threshold), Some(filesystem)) = (self.threshold, self.filesystem.as_deref())
        else {
            debug!(destination = %destination, "free-space gate disabled");
            return Ok(());
        };

        let (folder, _) = split_destination(destination);
        let mount = tokio::select! {
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            mount = session.mountpoint(folder) => mount?,
        };
        if mount.filesystem != filesystem {
            debug!(
                destination = %destination,
                filesystem = %mount.filesystem,
                gated = %filesystem,
                "destination not on gated filesystem"
            );
            return Ok(());
        }

        loop {
            let free = tokio::select! {
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                free = session.free_space_percent(&mount) => free?,
            };

            if free >= threshold {
                info!(
                    mount = %mount.target,
                    free_percent = free,
                    required = threshold,
                    "free space available"
                );
                return Ok(());
            }

            info!(
                mount = %mount.target,
                free_percent = free,
                required = threshold,
                retry_in = ?self.poll_interval,
                "waiting for free space"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangepull_remote::{MemorySession, Op};

    const FS: &str = "/dev/sdb1";

    fn gate(threshold: u8) -> FreeSpaceGate {
        FreeSpaceGate::new(Some(threshold), Some(FS.into()), Duration::from_secs(120))
    }

    fn session() -> MemorySession {
        let session = MemorySession::default();
        session.add_dir("/mnt/ingest");
        session.set_mount("/mnt/ingest", FS);
        session
    }

    #[tokio::test]
    async fn disabled_without_threshold_or_filesystem() {
        let session = session();
        session.script_free_space([0]);
        let cancel = CancellationToken::new();

        for gate in [
            FreeSpaceGate::new(None, Some(FS.into()), Duration::from_secs(1)),
            FreeSpaceGate::new(Some(50), None, Duration::from_secs(1)),
        ] {
            assert!(!gate.is_enabled());
            gate.admit(&session, "/mnt/ingest/f", &cancel).await.unwrap();
        }
        assert!(session.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn admits_on_first_sufficient_observation() {
        let session = session();
        session.script_free_space([60, 60, 85]);
        let start = tokio::time::Instant::now();

        gate(80)
            .admit(&session, "/mnt/ingest/f", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(session.count(Op::FreeSpace), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(240));
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_is_inclusive() {
        let session = session();
        session.script_free_space([80]);
        let start = tokio::time::Instant::now();
        gate(80)
            .admit(&session, "/mnt/ingest/f", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn other_filesystem_is_not_gated() {
        let session = MemorySession::default();
        session.add_dir("/data");
        session.set_mount("/", "/dev/sda1");
        session.script_free_space([1]);
        gate(80)
            .admit(&session, "/data/f", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(session.count(Op::FreeSpace), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_wait() {
        let session = session();
        session.script_free_space([10]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(300)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        let err = gate(80)
            .admit(&session, "/mnt/ingest/f", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(300 + 120));
    }

    #[tokio::test]
    async fn mount_is_resolved_from_destination_folder() {
        let session = session();
        session.script_free_space([90]);
        gate(80)
            .admit(&session, "/mnt/ingest/not-yet-there.mxf", &CancellationToken::new())
            .await
            .unwrap();

        let lookups: Vec<_> = session
            .calls()
            .into_iter()
            .filter(|c| c.op == Op::Mountpoint)
            .map(|c| c.path)
            .collect();
        assert_eq!(lookups, vec!["/mnt/ingest".to_string()]);
    }

    #[tokio::test]
    async fn observation_failure_is_fatal() {
        let session = session();
        session.fail_on(Op::FreeSpace);
        let err = gate(80)
            .admit(&session, "/mnt/ingest/f", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::RemoteUnavailable(_)));
    }
}
