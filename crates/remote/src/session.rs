//! The remote session capability.
//!
//! The engine only ever talks to the remote server through
//! [`RemoteSession`], which keeps orchestration decoupled from the
//! transport and testable against [`MemorySession`](crate::MemorySession).

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use rangepull_transfer::ByteRange;

use crate::error::RemoteError;

/// Boxed future returned by every session primitive.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// The object the remote server pulls from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceSpec {
    pub url: String,
    /// Forwarded verbatim on every request to the object store.
    pub headers: BTreeMap<String, String>,
}

impl SourceSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }
}

/// Filesystem mount owning a remote path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mountpoint {
    /// Mount target directory.
    pub target: String,
    /// Mounted device or source, as reported by `df`.
    pub filesystem: String,
    /// Free space at resolution time.
    pub free_percent: u8,
}

/// Result of a range fetch as reported by the remote fetch tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchStatus {
    pub http_status: u16,
    pub bytes: u64,
}

impl FetchStatus {
    /// Status reported for an empty range, where nothing is requested.
    pub const EMPTY: FetchStatus = FetchStatus {
        http_status: 204,
        bytes: 0,
    };

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.http_status)
    }
}

/// Primitives the engine needs on the remote server.
///
/// Every method suspends until the remote side responds, errors, or
/// times out. Implementations must be safe to call concurrently.
pub trait RemoteSession: Send + Sync {
    /// Host this session executes on.
    fn host(&self) -> &str;

    /// Whether a file or directory exists at `path`.
    fn exists<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, bool>;

    /// Size of the file at `path` in bytes.
    fn stat_size<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, u64>;

    /// Resolves the mount owning `path`, which must exist.
    fn mountpoint<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, Mountpoint>;

    /// Current free space of `mount`, in percent.
    fn free_space_percent<'a>(&'a self, mount: &'a Mountpoint) -> RemoteFuture<'a, u8>;

    /// Size of the source object, probed from the remote server.
    fn source_size<'a>(&'a self, source: &'a SourceSpec) -> RemoteFuture<'a, u64>;

    /// Fetches `range` of `source` into `dest` on the remote server.
    ///
    /// An empty range creates an empty file at `dest`.
    fn fetch_range<'a>(
        &'a self,
        source: &'a SourceSpec,
        range: ByteRange,
        dest: &'a str,
    ) -> RemoteFuture<'a, FetchStatus>;

    /// Creates `path` and any missing parents.
    fn mkdir<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, ()>;

    /// Concatenates `parts` in the given order into `dest`; returns its size.
    fn concat<'a>(&'a self, parts: &'a [String], dest: &'a str) -> RemoteFuture<'a, u64>;

    /// Renames `src` to `dest` within one filesystem.
    fn rename<'a>(&'a self, src: &'a str, dest: &'a str) -> RemoteFuture<'a, ()>;

    /// Sets the modification time of `path` to now.
    fn touch<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, ()>;

    /// Removes `path` and everything below it. Missing paths are not an error.
    fn remove_recursive<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_status_success_range() {
        assert!(FetchStatus { http_status: 200, bytes: 1 }.is_success());
        assert!(FetchStatus { http_status: 206, bytes: 1 }.is_success());
        assert!(FetchStatus::EMPTY.is_success());
        assert!(!FetchStatus { http_status: 404, bytes: 0 }.is_success());
        assert!(!FetchStatus { http_status: 302, bytes: 0 }.is_success());
    }
}
