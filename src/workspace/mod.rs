// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Run workspaces
//!
//! Every run gets its own directory under a temp root. The directory is
//! removed when the [`Workspace`] is released or dropped, whichever comes
//! first, so early returns, panics and dropped futures all clean up.

mod artifacts;

pub use artifacts::{collect_artifacts, ArtifactRecord};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::errors::{PipewrightError, PipewrightResult};
use crate::pipeline::RunId;

/// Allocates run workspaces
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    prefix: String,
}

impl WorkspaceManager {
    /// Manager allocating under the system temp directory
    pub fn new() -> Self {
        Self::with_root(std::env::temp_dir())
    }

    /// Manager allocating under `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prefix: "pipewright".to_string(),
        }
    }

    /// Directory workspaces are created in
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the workspace of `run_id` lives at
    pub fn path_for(&self, run_id: &RunId) -> PathBuf {
        self.root.join(format!("{}-{}", self.prefix, run_id))
    }

    /// Create the workspace of a run
    ///
    /// The directory itself must not exist yet; an existing one belongs to
    /// another run and is never reused.
    pub fn acquire(&self, run_id: &RunId) -> PipewrightResult<Workspace> {
        std::fs::create_dir_all(&self.root).map_err(|e| PipewrightError::WorkspaceCreate {
            path: self.root.clone(),
            error: e.to_string(),
        })?;

        let path = self.path_for(run_id);
        std::fs::create_dir(&path).map_err(|e| PipewrightError::WorkspaceCreate {
            path: path.clone(),
            error: e.to_string(),
        })?;

        debug!(run_id = %run_id, path = %path.display(), "workspace created");

        Ok(Workspace {
            path,
            released: AtomicBool::new(false),
        })
    }
}

impl Default for WorkspaceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusively owned directory of one run
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: AtomicBool,
}

impl Workspace {
    /// Location of the workspace
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively remove the workspace
    ///
    /// Only the first call does anything.
    pub fn release(&self) -> PipewrightResult<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "workspace removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipewrightError::WorkspaceRemove {
                path: self.path.clone(),
                error: e.to_string(),
            }),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "workspace cleanup on drop failed");
        }
    }
}

/// Remove everything inside `dir`, keeping `dir` itself
pub(crate) fn clear_dir(dir: &Path) -> PipewrightResult<()> {
    let to_error = |e: std::io::Error| PipewrightError::WorkspaceRemove {
        path: dir.to_path_buf(),
        error: e.to_string(),
    };

    for entry in std::fs::read_dir(dir).map_err(to_error)? {
        let entry = entry.map_err(to_error)?;
        let path = entry.path();
        if entry.file_type().map_err(to_error)?.is_dir() {
            std::fs::remove_dir_all(&path).map_err(to_error)?;
        } else {
            std::fs::remove_file(&path).map_err(to_error)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_acquire_and_release() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::with_root(root.path());
        let run_id = RunId::new();

        let ws = manager.acquire(&run_id).unwrap();
        assert!(ws.path().is_dir());
        assert!(ws.path().starts_with(root.path()));
        assert!(ws.path().to_string_lossy().contains(&run_id.to_string()));

        std::fs::create_dir_all(ws.path().join("nested/deeper")).unwrap();
        std::fs::write(ws.path().join("nested/deeper/file.txt"), "data").unwrap();

        ws.release().unwrap();
        assert!(!ws.path().exists());

        // Idempotent
        ws.release().unwrap();
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::with_root(root.path());

        let path = {
            let ws = manager.acquire(&RunId::new()).unwrap();
            std::fs::write(ws.path().join("artifact"), "x").unwrap();
            ws.path().to_path_buf()
        };

        assert!(!path.exists());
    }

    #[test]
    fn test_same_run_id_is_not_shared() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::with_root(root.path());
        let run_id = RunId::new();

        let _first = manager.acquire(&run_id).unwrap();
        let err = manager.acquire(&run_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Workspace);
    }

    #[test]
    fn test_unwritable_root_fails() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("not-a-dir");
        std::fs::write(&file, "").unwrap();

        let manager = WorkspaceManager::with_root(&file);
        let err = manager.acquire(&RunId::new()).unwrap_err();
        assert!(matches!(err, PipewrightError::WorkspaceCreate { .. }));
    }

    #[test]
    fn test_clear_dir_keeps_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::with_root(root.path())
            .acquire(&RunId::new())
            .unwrap();

        std::fs::create_dir(ws.path().join("src")).unwrap();
        std::fs::write(ws.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(ws.path().join("README"), "").unwrap();

        clear_dir(ws.path()).unwrap();
        assert!(ws.path().is_dir());
        assert_eq!(std::fs::read_dir(ws.path()).unwrap().count(), 0);
    }
}
