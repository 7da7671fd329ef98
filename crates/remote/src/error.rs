//! Remote session error types.

use std::time::Duration;

/// Errors produced by a remote session primitive.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection to {host} failed: {message}")]
    Connection { host: String, message: String },

    #[error("remote command timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote command failed (exit {code:?}): {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("unexpected remote output: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),
}
