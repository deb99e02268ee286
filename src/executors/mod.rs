// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Command executors
//!
//! This module provides the executor trait the engine runs stages through,
//! the process-backed implementation, and the version-control client used by
//! checkout stages.

mod checkout;
mod process;

pub use checkout::{GitClient, VcsClient};
pub use process::ProcessExecutor;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::errors::PipewrightError;

/// One command to run on behalf of a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Stage the command belongs to
    pub stage: String,

    /// Program name or path
    pub program: String,

    /// Arguments, passed verbatim
    pub args: Vec<String>,

    /// Working directory of the child
    pub working_dir: PathBuf,

    /// Variables overlaid on the current process environment
    pub env: HashMap<String, String>,

    /// Deadline for the whole command
    pub timeout: Duration,
}

/// Output of a command that ran to completion
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,

    /// Interleaved stdout and stderr lines
    pub output: String,

    /// Wall-clock run time
    pub duration: Duration,
}

/// A command that failed, with whatever output it produced
#[derive(Debug)]
pub struct CommandFailure {
    pub error: PipewrightError,
    pub output: CommandOutput,
}

impl CommandFailure {
    pub fn new(error: PipewrightError, output: CommandOutput) -> Self {
        Self { error, output }
    }
}

impl std::fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives command output line by line as it is produced
///
/// Implemented by the surrounding CLI or logging layer; the engine never
/// formats or timestamps lines itself.
pub trait OutputSink: Send + Sync {
    fn line(&self, stage: &str, stream: OutputStream, line: &str);
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn line(&self, _stage: &str, _stream: OutputStream, _line: &str) {}
}

/// Trait for command executors
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run one command
    ///
    /// Returns the output on a zero exit status. Non-zero exits fail with
    /// [`PipewrightError::CommandFailed`], deadlines with
    /// [`PipewrightError::Timeout`] and cancellation with
    /// [`PipewrightError::Cancelled`]; partial output is kept in every case.
    async fn run(
        &self,
        invocation: &Invocation,
        sink: &dyn OutputSink,
        cancel: &CancelToken,
    ) -> Result<CommandOutput, CommandFailure>;
}
