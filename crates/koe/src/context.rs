use std::path::Path;

use anyhow::{Context, Result};
use chord_analysis::Cancellation;
use tempfile::TempDir;

/// Per-request scratch space and cancellation.
///
/// Dropping the context removes the scratch directory and raises the
/// cancellation flag, so a handler future dropped on client disconnect stops
/// any analysis still running on the blocking pool.
pub struct RunContext {
    scratch: TempDir,
    cancel: Cancellation,
}

impl RunContext {
    pub fn new() -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("koe-run-")
            .tempdir()
            .context("failed to create run scratch directory")?;
        Ok(Self {
            scratch,
            cancel: Cancellation::new(),
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Handle for work that outlives a borrow of the context.
    pub fn cancellation(&self) -> Cancellation {
        self.cancel.clone()
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_removes_scratch_and_cancels() {
        let ctx = RunContext::new().unwrap();
        let dir = ctx.scratch_dir().to_path_buf();
        std::fs::write(dir.join("input.wav"), b"RIFF").unwrap();
        let cancel = ctx.cancellation();
        assert!(!cancel.is_cancelled());

        drop(ctx);
        assert!(!dir.exists());
        assert!(cancel.is_cancelled());
    }
}
