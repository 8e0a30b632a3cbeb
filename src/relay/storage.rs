//! Files the relay owns: the pid file
//!
//! Writes go through a temp file and a rename so a supervisor polling the pid
//! file never reads a half-written value.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::error::{StorageError, StorageResult};

/// Atomically replace `path` with `data`.
pub fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let failed = |detail: String| StorageError::AtomicWriteFailed {
        path: path.to_path_buf(),
        detail,
    };
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)
        .map_err(|e| failed(format!("create {}: {e}", temp_path.display())))?;
    file.write_all(data)
        .map_err(|e| failed(format!("write: {e}")))?;
    file.sync_all()
        .map_err(|e| failed(format!("sync: {e}")))?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(failed(format!("rename from {}: {e}", temp_path.display())));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let dir = OpenOptions::new().read(true).open(parent)?;
        dir.sync_all()?;
    }

    Ok(())
}

/// Pid file that is removed again when dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Record the current process id at `path`.
    pub fn create(path: impl Into<PathBuf>) -> StorageResult<Self> {
        Self::create_with_pid(path, std::process::id())
    }

    /// Record `pid` at `path`.
    pub fn create_with_pid(path: impl Into<PathBuf>, pid: u32) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&path, format!("{pid}\n").as_bytes())?;
        debug!(path = %path.display(), pid, "wrote pid file");
        Ok(Self { path })
    }

    /// Location of the pid file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove pid file");
            }
        }
    }
}
