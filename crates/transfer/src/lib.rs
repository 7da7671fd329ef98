//! Byte-range planning and remote temp layout.
//!
//! Splits a source file into equal-size parts and names the remote
//! artifacts (temp directory, part files, assembled file) of one job.

mod layout;
mod plan;
mod types;
mod validation;

pub use layout::TempLayout;
pub use plan::{plan_parts, plan_ranges};
pub use types::{ByteRange, Part};
pub use validation::{split_destination, validate_destination_path};

/// Default part size: 256 MiB.
pub const DEFAULT_PART_SIZE: i64 = 256 * 1024 * 1024;

/// Errors produced while planning a transfer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
