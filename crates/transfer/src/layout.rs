//! Remote temp-directory layout for one job.

use crate::validation::split_destination;

/// Names every remote artifact a job creates.
///
/// The temp directory sits next to the destination so the final rename
/// stays on one filesystem, and carries the job id so concurrent jobs for
/// different destinations never share it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempLayout {
    tmp_dir: String,
    file_name: String,
}

impl TempLayout {
    /// Derives the layout for `destination_path` (already validated) and `job_id`.
    pub fn new(destination_path: &str, job_id: &str) -> Self {
        let (dir, name) = split_destination(destination_path);
        let tmp_name = format!(".{name}.{job_id}.part");
        let tmp_dir = if dir == "/" {
            format!("/{tmp_name}")
        } else {
            format!("{dir}/{tmp_name}")
        };
        Self {
            tmp_dir,
            file_name: name.to_string(),
        }
    }

    pub fn tmp_dir(&self) -> &str {
        &self.tmp_dir
    }

    /// Temp path of part `index`.
    pub fn part_path(&self, index: usize) -> String {
        format!("{}/{}.part{index}", self.tmp_dir, self.file_name)
    }

    /// Temp path of the concatenated whole file.
    pub fn assembled_path(&self) -> String {
        format!("{}/{}.tmp", self.tmp_dir, self.file_name)
    }
}
