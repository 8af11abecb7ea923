//! Per-request scratch space
//!
//! Every temporary file a request creates lives under one directory that is
//! removed when the [`RequestWorkspace`] is dropped, whichever way the
//! request ends.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Scoped scratch directory for one request
#[derive(Debug)]
pub struct RequestWorkspace {
    dir: Option<TempDir>,
    root: PathBuf,
    input_path: PathBuf,
    stems_dir: PathBuf,
    archive_path: PathBuf,
}

impl RequestWorkspace {
    /// Create a fresh workspace under `scratch_root`
    pub fn create(scratch_root: &Path, request_id: &str) -> Result<Self> {
        fs::create_dir_all(scratch_root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("stemsplit-{}-", request_id))
            .tempdir_in(scratch_root)?;

        let stems_dir = dir.path().join("stems");
        fs::create_dir(&stems_dir)?;

        debug!("Workspace {}", dir.path().display());

        Ok(Self {
            input_path: dir.path().join("input"),
            archive_path: dir.path().join("stems.zip"),
            stems_dir,
            root: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write the decoded request audio, using `extension` as a decoder hint
    pub fn stage_input(&mut self, audio: &[u8], extension: Option<&str>) -> Result<&Path> {
        if let Some(ext) = extension {
            self.input_path.set_extension(ext);
        }
        fs::write(&self.input_path, audio)?;
        Ok(&self.input_path)
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// Directory for rendered stem files
    pub fn stems_dir(&self) -> &Path {
        &self.stems_dir
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Remove the workspace now, reporting failures as a cleanup warning
    pub fn cleanup(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!("Removed workspace {}", path.display()),
                Err(e) => warn!(
                    kind = "CleanupWarning",
                    "Failed to remove workspace {}: {}",
                    path.display(),
                    e
                ),
            }
        }
    }
}

impl Drop for RequestWorkspace {
    fn drop(&mut self) {
        self.release();
    }
}
