//! Remote server access for rangepull.
//!
//! All filesystem and network work of a transfer happens on the remote
//! server. This crate defines the [`RemoteSession`] primitives, an
//! OpenSSH-backed implementation and an in-memory one.

pub mod command;
mod error;
mod memory;
mod session;
mod ssh;

pub use error::RemoteError;
pub use memory::{Call, FetchFault, MemorySession, Op};
pub use session::{FetchStatus, Mountpoint, RemoteFuture, RemoteSession, SourceSpec};
pub use ssh::{SshSession, SshTarget, DEFAULT_COMMAND_TIMEOUT};
