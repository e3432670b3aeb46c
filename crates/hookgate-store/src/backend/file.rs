use std::path::{Path, PathBuf};

use tracing::debug;

use crate::backend::{Mutation, StateBackend};
use crate::error::StoreError;
use crate::snapshot::Snapshot;

/// Whole-snapshot JSON file.
///
/// Every mutation rewrites the file via write-to-temp-then-rename, so a crash
/// mid-write leaves the previous snapshot intact.
#[derive(Clone, Debug)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Backend writing to `path`. The file need not exist yet.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Snapshot file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn load(&self) -> Result<Snapshot, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no state snapshot yet");
            return Ok(Snapshot::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Snapshot::from_json(&raw)
    }

    fn apply(&self, _mutation: Mutation<'_>, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.temp_path();
        std::fs::write(&tmp, snapshot.to_json()?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
