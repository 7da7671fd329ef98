//! [`RemoteSession`] over the system OpenSSH client.
//!
//! Each primitive runs as one `ssh <host> -- <command>` process. The
//! child is killed when its future is dropped, so cancelling a job also
//! stops its in-flight remote commands.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use rangepull_transfer::ByteRange;
use tracing::{debug, trace};

use crate::command;
use crate::error::RemoteError;
use crate::session::{FetchStatus, Mountpoint, RemoteFuture, RemoteSession, SourceSpec};

/// Exit status OpenSSH uses for its own (connection) errors.
const SSH_CONNECTION_ERROR: i32 = 255;

/// Default timeout for one remote command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// How to reach the remote server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    /// Extra `-o` options (`Key=Value`).
    pub options: Vec<String>,
}

impl SshTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            identity_file: None,
            options: Vec::new(),
        }
    }

    /// `user@host` or `host`.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

/// Remote session backed by the `ssh` binary.
pub struct SshSession {
    target: SshTarget,
    command_timeout: Duration,
}

impl SshSession {
    pub fn new(target: SshTarget, command_timeout: Duration) -> Self {
        Self {
            target,
            command_timeout,
        }
    }

    fn build_command(&self, remote_command: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes"]);
        if let Some(port) = self.target.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = &self.target.identity_file {
            cmd.arg("-i").arg(identity);
        }
        for option in &self.target.options {
            cmd.arg("-o").arg(option);
        }
        cmd.arg(self.target.destination())
            .arg("--")
            .arg(remote_command)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Runs `remote_command` on the target and returns its stdout.
    pub async fn exec(&self, remote_command: &str) -> Result<String, RemoteError> {
        trace!(host = %self.target.host, command = %remote_command, "ssh exec");

        let output = tokio::time::timeout(
            self.command_timeout,
            self.build_command(remote_command).output(),
        )
        .await
        .map_err(|_| RemoteError::Timeout(self.command_timeout))??;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(
            host = %self.target.host,
            code = ?output.status.code(),
            stderr = %stderr,
            "remote command failed"
        );
        match output.status.code() {
            Some(SSH_CONNECTION_ERROR) => Err(RemoteError::Connection {
                host: self.target.host.clone(),
                message: stderr,
            }),
            code => Err(RemoteError::CommandFailed { code, stderr }),
        }
    }
}

impl RemoteSession for SshSession {
    fn host(&self) -> &str {
        &self.target.host
    }

    fn exists<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, bool> {
        Box::pin(async move { command::parse_exists(&self.exec(&command::exists(path)).await?) })
    }

    fn stat_size<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, u64> {
        Box::pin(async move {
            match self.exec(&command::stat_size(path)).await {
                Ok(out) => command::parse_size(&out),
                Err(RemoteError::CommandFailed { .. }) => {
                    Err(RemoteError::NotFound(path.to_string()))
                }
                Err(e) => Err(e),
            }
        })
    }

    fn mountpoint<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, Mountpoint> {
        Box::pin(async move {
            command::parse_mountpoint(&self.exec(&command::mountpoint(path)).await?)
        })
    }

    fn free_space_percent<'a>(&'a self, mount: &'a Mountpoint) -> RemoteFuture<'a, u8> {
        Box::pin(async move {
            command::parse_free_percent(&self.exec(&command::used_percent(&mount.target)).await?)
        })
    }

    fn source_size<'a>(&'a self, source: &'a SourceSpec) -> RemoteFuture<'a, u64> {
        Box::pin(async move {
            command::parse_content_length(&self.exec(&command::source_size(source)).await?)
        })
    }

    fn fetch_range<'a>(
        &'a self,
        source: &'a SourceSpec,
        range: ByteRange,
        dest: &'a str,
    ) -> RemoteFuture<'a, FetchStatus> {
        Box::pin(async move {
            command::parse_fetch_status(&self.exec(&command::fetch_range(source, range, dest)).await?)
        })
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move { self.exec(&command::mkdir(path)).await.map(drop) })
    }

    fn concat<'a>(&'a self, parts: &'a [String], dest: &'a str) -> RemoteFuture<'a, u64> {
        Box::pin(async move { command::parse_size(&self.exec(&command::concat(parts, dest)).await?) })
    }

    fn rename<'a>(&'a self, src: &'a str, dest: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move { self.exec(&command::rename(src, dest)).await.map(drop) })
    }

    fn touch<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move { self.exec(&command::touch(path)).await.map(drop) })
    }

    fn remove_recursive<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move { self.exec(&command::remove_recursive(path)).await.map(drop) })
    }
}
