use std::fmt;

/// A half-open byte range `[start, start + len)` of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub len: u64,
}

impl ByteRange {
    pub fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    /// Last byte covered, inclusive. `None` for a zero-length range.
    pub fn end_inclusive(&self) -> Option<u64> {
        if self.len == 0 {
            None
        } else {
            Some(self.start + self.len - 1)
        }
    }

    /// One past the last byte covered.
    pub fn end_exclusive(&self) -> u64 {
        self.start + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// HTTP `Range` spec (`start-end`), or `None` for an empty range.
    pub fn http_spec(&self) -> Option<String> {
        self.end_inclusive().map(|end| format!("{}-{end}", self.start))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end_inclusive() {
            Some(end) => write!(f, "[{}-{end}]", self.start),
            None => write!(f, "[{}, empty]", self.start),
        }
    }
}

/// One independently fetched piece of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Position in the assembly order (0-based).
    pub index: usize,
    pub range: ByteRange,
    /// Remote path the part is fetched into.
    pub temp_path: String,
}
