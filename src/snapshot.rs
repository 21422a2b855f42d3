use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Snapshot files written during one run. Every file is removed on `purge`
/// or when the set is dropped.
#[derive(Debug)]
pub struct SnapshotSet {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl SnapshotSet {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
        }
    }

    /// Write PNG bytes to a fresh file and return its path.
    pub fn store(&mut self, png: &[u8]) -> Result<PathBuf> {
        let (mut file, path) = tempfile::Builder::new()
            .prefix("webagent-snapshot-")
            .suffix(".png")
            .tempfile_in(&self.dir)
            .with_context(|| format!("creating snapshot in {}", self.dir.display()))?
            .keep()
            .context("persisting snapshot file")?;
        self.files.push(path.clone());

        file.write_all(png)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        Ok(path)
    }

    pub fn outstanding(&self) -> usize {
        self.files.len()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.files
    }

    /// Delete every tracked file. Returns how many were removed.
    pub fn purge(&mut self) -> usize {
        let mut removed = 0;
        for path in self.files.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to delete snapshot")
                }
            }
        }
        removed
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for SnapshotSet {
    fn drop(&mut self) {
        self.purge();
    }
}
