//! In-memory [`RemoteSession`].
//!
//! Simulates a remote filesystem plus an object store, records every
//! primitive call, and can inject failures, delays and scripted
//! free-space observations. Used by the engine and service tests.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rangepull_transfer::ByteRange;

use crate::error::RemoteError;
use crate::session::{FetchStatus, Mountpoint, RemoteFuture, RemoteSession, SourceSpec};

/// Session primitives, for call recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Exists,
    StatSize,
    Mountpoint,
    FreeSpace,
    SourceSize,
    Fetch,
    Mkdir,
    Concat,
    Rename,
    Touch,
    Remove,
}

impl Op {
    /// Whether the primitive changes remote state.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Op::Fetch | Op::Mkdir | Op::Concat | Op::Rename | Op::Touch | Op::Remove
        )
    }
}

/// One recorded primitive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    /// Primary path argument (destination for fetch/concat/rename).
    pub path: String,
}

/// Misbehaviour of a single range fetch, keyed by range start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFault {
    /// The object store answers with this HTTP status.
    Status(u16),
    /// The remote command itself fails.
    Transport,
    /// Only this many bytes land on disk although the status is 206.
    ShortWrite(u64),
}

struct State {
    files: HashMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    objects: HashMap<String, Vec<u8>>,
    mount: Mountpoint,
    free_space: VecDeque<u8>,
    failing: HashSet<Op>,
    fetch_faults: HashMap<u64, FetchFault>,
    calls: Vec<Call>,
    /// Every (path, size) a file was created or replaced with.
    writes: Vec<(String, u64)>,
}

/// In-memory remote server.
pub struct MemorySession {
    host: String,
    state: Mutex<State>,
    fetch_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemorySession {
    /// Creates an empty server with `/` as its only directory.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            state: Mutex::new(State {
                files: HashMap::new(),
                dirs: BTreeSet::from(["/".to_string()]),
                objects: HashMap::new(),
                mount: Mountpoint {
                    target: "/".into(),
                    filesystem: "/dev/root".into(),
                    free_percent: 100,
                },
                free_space: VecDeque::new(),
                failing: HashSet::new(),
                fetch_faults: HashMap::new(),
                calls: Vec::new(),
                writes: Vec::new(),
            }),
            fetch_delay: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Setup --------------------------------------------------------------

    /// Publishes an object in the simulated object store.
    pub fn put_object(&self, url: impl Into<String>, data: Vec<u8>) {
        self.state().objects.insert(url.into(), data);
    }

    /// Creates a directory and its parents.
    pub fn add_dir(&self, path: &str) {
        insert_dir_all(&mut self.state().dirs, path);
    }

    /// Places a file without recording a call.
    pub fn put_file(&self, path: &str, data: Vec<u8>) {
        let mut s = self.state();
        insert_dir_all(&mut s.dirs, parent(path));
        s.files.insert(path.to_string(), data);
    }

    /// Sets the mount every path resolves to.
    pub fn set_mount(&self, target: &str, filesystem: &str) {
        let mut s = self.state();
        s.mount.target = target.to_string();
        s.mount.filesystem = filesystem.to_string();
    }

    /// Scripts successive free-space observations; the last one repeats.
    pub fn script_free_space(&self, observations: impl IntoIterator<Item = u8>) {
        self.state().free_space = observations.into_iter().collect();
    }

    /// Makes every call of `op` fail with a connection error.
    pub fn fail_on(&self, op: Op) {
        self.state().failing.insert(op);
    }

    /// Injects a fault into the fetch whose range starts at `range_start`.
    pub fn fault_fetch(&self, range_start: u64, fault: FetchFault) {
        self.state().fetch_faults.insert(range_start, fault);
    }

    /// Delays every fetch, to observe concurrency and cancellation.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self
            .fetch_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }

    // -- Inspection ---------------------------------------------------------

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.state().calls.iter().filter(|c| c.op == op).count()
    }

    pub fn mutation_count(&self) -> usize {
        self.state().calls.iter().filter(|c| c.op.is_mutation()).count()
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state().dirs.contains(path)
    }

    /// Paths of every file or directory at or below `prefix`.
    pub fn entries_under(&self, prefix: &str) -> Vec<String> {
        let s = self.state();
        let nested = format!("{}/", prefix.trim_end_matches('/'));
        s.files
            .keys()
            .chain(s.dirs.iter())
            .filter(|p| p.as_str() == prefix || p.starts_with(&nested))
            .cloned()
            .collect()
    }

    /// Sizes `path` was ever written with, in order.
    pub fn write_history(&self, path: &str) -> Vec<u64> {
        self.state()
            .writes
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, size)| *size)
            .collect()
    }

    /// Highest number of fetches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    // -- Internals ----------------------------------------------------------

    /// Records the call and applies injected failures.
    fn begin(&self, op: Op, path: &str) -> Result<(), RemoteError> {
        let mut s = self.state();
        s.calls.push(Call {
            op,
            path: path.to_string(),
        });
        if s.failing.contains(&op) {
            return Err(RemoteError::Connection {
                host: self.host.clone(),
                message: format!("injected failure on {op:?}"),
            });
        }
        Ok(())
    }

    fn write_file(s: &mut State, path: &str, data: Vec<u8>) -> Result<(), RemoteError> {
        if !s.dirs.contains(parent(path)) {
            return Err(no_such_dir(path));
        }
        s.writes.push((path.to_string(), data.len() as u64));
        s.files.insert(path.to_string(), data);
        Ok(())
    }

    fn do_fetch(
        &self,
        source: &SourceSpec,
        range: ByteRange,
        dest: &str,
    ) -> Result<FetchStatus, RemoteError> {
        let mut s = self.state();
        let fault = s.fetch_faults.get(&range.start).copied();
        if fault == Some(FetchFault::Transport) {
            return Err(RemoteError::CommandFailed {
                code: Some(56),
                stderr: "curl: (56) Recv failure: Connection reset by peer".into(),
            });
        }
        if range.is_empty() {
            Self::write_file(&mut s, dest, Vec::new())?;
            return Ok(FetchStatus::EMPTY);
        }
        let Some(object) = s.objects.get(&source.url).cloned() else {
            Self::write_file(&mut s, dest, Vec::new())?;
            return Ok(FetchStatus {
                http_status: 404,
                bytes: 0,
            });
        };
        if let Some(FetchFault::Status(code)) = fault {
            Self::write_file(&mut s, dest, Vec::new())?;
            return Ok(FetchStatus {
                http_status: code,
                bytes: 0,
            });
        }
        let start = (range.start as usize).min(object.len());
        let end = (range.end_exclusive() as usize).min(object.len());
        let mut data = object[start..end].to_vec();
        if let Some(FetchFault::ShortWrite(n)) = fault {
            data.truncate(n as usize);
        }
        let bytes = data.len() as u64;
        Self::write_file(&mut s, dest, data)?;
        Ok(FetchStatus {
            http_status: 206,
            bytes,
        })
    }
}

fn parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((dir, _)) => dir,
    }
}

fn insert_dir_all(dirs: &mut BTreeSet<String>, path: &str) {
    let mut current = path.trim_end_matches('/');
    while !current.is_empty() {
        dirs.insert(current.to_string());
        current = match current.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => "",
        };
    }
    dirs.insert("/".to_string());
}

fn no_such_dir(path: &str) -> RemoteError {
    RemoteError::CommandFailed {
        code: Some(1),
        stderr: format!("{path}: No such file or directory"),
    }
}

/// Decrements the in-flight counter when a fetch ends or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RemoteSession for MemorySession {
    fn host(&self) -> &str {
        &self.host
    }

    fn exists<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, bool> {
        Box::pin(async move {
            self.begin(Op::Exists, path)?;
            let s = self.state();
            Ok(s.files.contains_key(path) || s.dirs.contains(path))
        })
    }

    fn stat_size<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, u64> {
        Box::pin(async move {
            self.begin(Op::StatSize, path)?;
            self.state()
                .files
                .get(path)
                .map(|data| data.len() as u64)
                .ok_or_else(|| RemoteError::NotFound(path.to_string()))
        })
    }

    fn mountpoint<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, Mountpoint> {
        Box::pin(async move {
            self.begin(Op::Mountpoint, path)?;
            let s = self.state();
            // df only resolves paths that exist.
            if !s.files.contains_key(path) && !s.dirs.contains(path) {
                return Err(RemoteError::NotFound(path.to_string()));
            }
            let mut mount = s.mount.clone();
            if let Some(current) = s.free_space.front() {
                mount.free_percent = *current;
            }
            Ok(mount)
        })
    }

    fn free_space_percent<'a>(&'a self, mount: &'a Mountpoint) -> RemoteFuture<'a, u8> {
        Box::pin(async move {
            self.begin(Op::FreeSpace, &mount.target)?;
            let mut s = self.state();
            let observed = if s.free_space.len() > 1 {
                s.free_space.pop_front()
            } else {
                s.free_space.front().copied()
            };
            Ok(observed.unwrap_or(s.mount.free_percent))
        })
    }

    fn source_size<'a>(&'a self, source: &'a SourceSpec) -> RemoteFuture<'a, u64> {
        Box::pin(async move {
            self.begin(Op::SourceSize, &source.url)?;
            self.state()
                .objects
                .get(&source.url)
                .map(|data| data.len() as u64)
                .ok_or_else(|| RemoteError::NotFound(source.url.clone()))
        })
    }

    fn fetch_range<'a>(
        &'a self,
        source: &'a SourceSpec,
        range: ByteRange,
        dest: &'a str,
    ) -> RemoteFuture<'a, FetchStatus> {
        Box::pin(async move {
            self.begin(Op::Fetch, dest)?;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = InFlight(&self.in_flight);
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = *self
                .fetch_delay
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.do_fetch(source, range, dest)
        })
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            self.begin(Op::Mkdir, path)?;
            insert_dir_all(&mut self.state().dirs, path);
            Ok(())
        })
    }

    fn concat<'a>(&'a self, parts: &'a [String], dest: &'a str) -> RemoteFuture<'a, u64> {
        Box::pin(async move {
            self.begin(Op::Concat, dest)?;
            let mut s = self.state();
            let mut data = Vec::new();
            for part in parts {
                let chunk = s.files.get(part).ok_or_else(|| no_such_dir(part))?;
                data.extend_from_slice(chunk);
            }
            let size = data.len() as u64;
            Self::write_file(&mut s, dest, data)?;
            Ok(size)
        })
    }

    fn rename<'a>(&'a self, src: &'a str, dest: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            self.begin(Op::Rename, dest)?;
            let mut s = self.state();
            if !s.dirs.contains(parent(dest)) {
                return Err(no_such_dir(dest));
            }
            let data = s.files.remove(src).ok_or_else(|| no_such_dir(src))?;
            s.writes.push((dest.to_string(), data.len() as u64));
            s.files.insert(dest.to_string(), data);
            Ok(())
        })
    }

    fn touch<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            self.begin(Op::Touch, path)?;
            let mut s = self.state();
            if !s.files.contains_key(path) {
                Self::write_file(&mut s, path, Vec::new())?;
            }
            Ok(())
        })
    }

    fn remove_recursive<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            self.begin(Op::Remove, path)?;
            let mut s = self.state();
            let nested = format!("{}/", path.trim_end_matches('/'));
            s.files.retain(|p, _| p != path && !p.starts_with(&nested));
            s.dirs.retain(|p| p != path && !p.starts_with(&nested));
            Ok(())
        })
    }
}
