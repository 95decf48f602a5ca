//! Per-request scratch directories
//!
//! A [`Scratch`] owns a private temporary directory. It is removed when the
//! value is dropped, so every exit path of a job (success, compile failure,
//! timeout, panic) releases it.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, instrument, warn};

use crate::sandbox::SandboxError;

#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    /// Create a uniquely named directory under `root`, or under the system
    /// temp dir when `root` is `None`
    #[instrument]
    pub fn create(root: Option<&Path>) -> Result<Self, SandboxError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("runbox-");
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(SandboxError::ScratchFailed)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(SandboxError::ScratchFailed)?;

        debug!(path = %dir.path().display(), "created scratch directory");
        Ok(Self { dir })
    }

    /// Path of the scratch directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Get the path to a file inside the scratch directory
    ///
    /// Returns an error if the name tries to leave the directory.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, SandboxError> {
        if name.is_empty() || name.contains("..") || name.starts_with('/') {
            return Err(SandboxError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(self.dir.path().join(name))
    }

    /// Create a private, uniquely named directory for one test
    ///
    /// It is removed when the returned value is dropped.
    pub fn workspace(&self) -> Result<TempDir, SandboxError> {
        let dir = tempfile::Builder::new()
            .prefix("test-")
            .tempdir_in(self.path())
            .map_err(SandboxError::ScratchFailed)?;
        debug!(path = %dir.path().display(), "created test workspace");
        Ok(dir)
    }

    /// Write a file into the scratch directory and return its path
    #[instrument(skip(self, content))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<PathBuf, SandboxError> {
        let path = self.file_path(name)?;
        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to scratch");
        Ok(path)
    }

    /// Check if a file exists in the scratch directory
    pub async fn file_exists(&self, name: &str) -> Result<bool, SandboxError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    /// Remove the directory now and report failures
    ///
    /// Dropping a `Scratch` also removes it, but silently.
    pub fn close(self) -> Result<(), SandboxError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to remove scratch directory");
            SandboxError::Io(e)
        })
    }
}
