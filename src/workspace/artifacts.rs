// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Artifact collection
//!
//! Copies files matching the pipeline's artifact patterns out of the
//! workspace before it is removed, recording a BLAKE3 digest of each.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::{PipewrightError, PipewrightResult};

/// A file kept from a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    /// Path relative to the workspace (and to the artifacts directory)
    pub path: PathBuf,

    /// Size in bytes
    pub size: u64,

    /// Hex-encoded BLAKE3 digest of the contents
    pub blake3: String,
}

/// Copy every file matching `patterns` from `workspace` into `dest`
///
/// Patterns are relative to the workspace; absolute patterns and patterns
/// climbing out with `..` are rejected. Patterns matching nothing, and files
/// that fail to copy, are logged and skipped.
pub fn collect_artifacts(
    workspace: &Path,
    patterns: &[String],
    dest: &Path,
) -> PipewrightResult<Vec<ArtifactRecord>> {
    let mut matched = BTreeSet::new();

    for pattern in patterns {
        let relative = Path::new(pattern);
        if relative.is_absolute()
            || relative.components().any(|c| matches!(c, Component::ParentDir))
        {
            return Err(PipewrightError::GlobPattern {
                message: format!("artifact pattern '{}' must stay inside the workspace", pattern),
            });
        }

        let full_pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&workspace.to_string_lossy()),
            pattern
        );

        let before = matched.len();
        for entry in glob::glob(&full_pattern)? {
            let path = entry.map_err(|e| PipewrightError::Io {
                message: e.to_string(),
            })?;
            if path.is_file() {
                matched.insert(path);
            }
        }

        if matched.len() == before {
            warn!(pattern = %pattern, "artifact pattern matched no files");
        }
    }

    let mut records = Vec::with_capacity(matched.len());
    for source in matched {
        let Ok(relative) = source.strip_prefix(workspace) else {
            continue;
        };
        match copy_artifact(&source, &dest.join(relative)) {
            Ok((size, digest)) => {
                debug!(artifact = %relative.display(), bytes = size, "artifact collected");
                records.push(ArtifactRecord {
                    path: relative.to_path_buf(),
                    size,
                    blake3: digest,
                });
            }
            Err(e) => warn!(artifact = %relative.display(), error = %e, "artifact not collected"),
        }
    }

    Ok(records)
}

/// Copy one file, returning its size and hex digest
fn copy_artifact(source: &Path, target: &Path) -> PipewrightResult<(u64, String)> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = std::fs::read(source).map_err(|e| PipewrightError::FileReadError {
        path: source.to_path_buf(),
        error: e.to_string(),
    })?;
    std::fs::write(target, &content)?;

    Ok((content.len() as u64, blake3::hash(&content).to_hex().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_matching_files() {
        let workspace = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        std::fs::create_dir_all(workspace.path().join("target/release")).unwrap();
        std::fs::write(workspace.path().join("target/release/app"), "binary").unwrap();
        std::fs::write(workspace.path().join("target/release/app.d"), "deps").unwrap();
        std::fs::write(workspace.path().join("README.md"), "docs").unwrap();

        let records = collect_artifacts(
            workspace.path(),
            &["target/release/app".to_string(), "*.md".to_string()],
            dest.path(),
        )
        .unwrap();

        let paths: Vec<_> = records.iter().map(|r| r.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("README.md"), PathBuf::from("target/release/app")]
        );
        assert_eq!(
            std::fs::read_to_string(dest.path().join("target/release/app")).unwrap(),
            "binary"
        );
        assert_eq!(records[1].size, 6);
        assert_eq!(records[1].blake3, blake3::hash(b"binary").to_hex().to_string());
    }

    #[test]
    fn test_overlapping_patterns_copy_once() {
        let workspace = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(workspace.path().join("out.txt"), "x").unwrap();

        let records = collect_artifacts(
            workspace.path(),
            &["*.txt".to_string(), "out.*".to_string()],
            dest.path(),
        )
        .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_failed_copy_keeps_the_others() {
        let workspace = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(workspace.path().join("a.txt"), "first").unwrap();
        std::fs::write(workspace.path().join("b.txt"), "second").unwrap();

        // A directory in the way makes writing a.txt fail
        std::fs::create_dir(dest.path().join("a.txt")).unwrap();

        let records =
            collect_artifacts(workspace.path(), &["*.txt".to_string()], dest.path()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, PathBuf::from("b.txt"));
        assert_eq!(
            std::fs::read_to_string(dest.path().join("b.txt")).unwrap(),
            "second"
        );
    }

    #[test]
    fn test_rejects_escaping_patterns() {
        let workspace = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        let err = collect_artifacts(workspace.path(), &["../secret".to_string()], dest.path())
            .unwrap_err();
        assert!(matches!(err, PipewrightError::GlobPattern { .. }));
    }

    #[test]
    fn test_unmatched_pattern_is_not_an_error() {
        let workspace = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        let records =
            collect_artifacts(workspace.path(), &["dist/*.tar.gz".to_string()], dest.path()).unwrap();
        assert!(records.is_empty());
    }
}
