// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Version-control client
//!
//! Checkout stages don't talk to a VCS library: they describe a clone as an
//! ordinary [`Invocation`] and run it through the same executor, so retries,
//! timeouts and cancellation behave exactly as for any other command.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::Invocation;

/// Builds the command that clones a repository
pub trait VcsClient: Send + Sync {
    /// Command cloning `branch` of `url` into `target_dir`
    fn clone_invocation(&self, stage: &str, url: &str, branch: &str, target_dir: &Path) -> Invocation;
}

/// `git clone` based client
#[derive(Debug, Clone)]
pub struct GitClient {
    program: PathBuf,
}

impl GitClient {
    /// Locate `git` on the PATH, falling back to the bare name
    pub fn new() -> Self {
        let program = which::which("git").unwrap_or_else(|_| PathBuf::from("git"));
        Self { program }
    }

    /// Use a specific git binary
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GitClient {
    fn default() -> Self {
        Self::new()
    }
}

impl VcsClient for GitClient {
    fn clone_invocation(&self, stage: &str, url: &str, branch: &str, target_dir: &Path) -> Invocation {
        let args = vec![
            "clone".to_string(),
            "--branch".to_string(),
            branch.to_string(),
            "--".to_string(),
            url.to_string(),
            target_dir.to_string_lossy().into_owned(),
        ];

        // Never block on a credential prompt
        let mut env = HashMap::new();
        env.insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());

        Invocation {
            stage: stage.to_string(),
            program: self.program.to_string_lossy().into_owned(),
            args,
            working_dir: target_dir.to_path_buf(),
            env,
            // Set by the stage runner from the stage's timeout
            timeout: std::time::Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_invocation() {
        let client = GitClient::with_program("git");
        let inv = client.clone_invocation(
            "checkout",
            "https://example.com/repo.git",
            "main",
            Path::new("/tmp/ws"),
        );

        assert_eq!(inv.program, "git");
        assert_eq!(
            inv.args,
            vec!["clone", "--branch", "main", "--", "https://example.com/repo.git", "/tmp/ws"]
        );
        assert_eq!(inv.working_dir, PathBuf::from("/tmp/ws"));
        assert_eq!(inv.env["GIT_TERMINAL_PROMPT"], "0");
    }
}
