//! Transfer orchestration engine.
//!
//! Moves a file from an object store onto a remote server without the
//! bytes passing through this process: the remote server is driven over
//! a [`RemoteSession`](rangepull_remote::RemoteSession) to pull byte
//! ranges itself.
//!
//! # Pipeline
//!
//! 1. **Guard**: skip when the destination already exists
//! 2. **Gate**: wait until the target filesystem has enough free space
//! 3. **Plan**: split the file into equal-size byte ranges
//! 4. **Fetch**: pull the ranges concurrently into a temp directory
//! 5. **Assemble**: concatenate in order and rename onto the destination
//! 6. **Cleanup**: remove the temp directory on every terminal path

pub mod assemble;
pub mod cleanup;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod guard;
pub mod orchestrator;
pub mod types;

// Re-export primary types for convenience.
pub use assemble::Assembler;
pub use cleanup::CleanupManager;
pub use error::TransferError;
pub use fetch::PartFetchExecutor;
pub use gate::FreeSpaceGate;
pub use guard::{GuardDecision, IdempotencyGuard};
pub use orchestrator::TransferOrchestrator;
pub use types::{
    DEFAULT_POLL_INTERVAL, EngineConfig, JobEvent, JobReport, JobStatus, PartOutcome,
    TransferJob, TransferOutcome,
};
