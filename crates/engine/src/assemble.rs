//! Ordered assembly and atomic finalize.

use rangepull_remote::RemoteSession;
use rangepull_transfer::{Part, TempLayout};
use tracing::{info, warn};

use crate::error::TransferError;

/// Joins fetched parts into the destination file.
pub struct Assembler<'a> {
    session: &'a dyn RemoteSession,
}

impl<'a> Assembler<'a> {
    pub fn new(session: &'a dyn RemoteSession) -> Self {
        Self { session }
    }

    /// Concatenates `parts` by ascending index into the layout's assembled
    /// path, checks its size, then renames it onto `destination`.
    ///
    /// The destination is only ever touched by the final rename.
    pub async fn assemble(
        &self,
        parts: &[Part],
        layout: &TempLayout,
        destination: &str,
        expected_size: u64,
    ) -> Result<u64, TransferError> {
        let mut ordered: Vec<&Part> = parts.iter().collect();
        ordered.sort_by_key(|p| p.index);
        let inputs: Vec<String> = ordered.iter().map(|p| p.temp_path.clone()).collect();

        let assembled = layout.assembled_path();
        let size = self
            .session
            .concat(&inputs, &assembled)
            .await
            .map_err(|e| TransferError::AssemblyFailed(format!("concatenation failed: {e}")))?;
        if size != expected_size {
            return Err(TransferError::AssemblyFailed(format!(
                "assembled {size} bytes, expected {expected_size}"
            )));
        }

        self.session
            .rename(&assembled, destination)
            .await
            .map_err(|e| TransferError::AssemblyFailed(format!("rename failed: {e}")))?;

        if let Err(e) = self.session.touch(destination).await {
            warn!(destination = %destination, error = %e, "failed to update modification time");
        }

        info!(destination = %destination, bytes = size, parts = parts.len(), "file assembled");
        Ok(size)
    }
}
