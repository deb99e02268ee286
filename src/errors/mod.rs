// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Error types
//!
//! Every failure the engine can report is a [`PipewrightError`]. Variants are
//! grouped by [`ErrorKind`], which drives retry decisions and tells callers
//! whether a run was rejected up front or failed while running.

use miette::Diagnostic;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for pipewright operations
pub type PipewrightResult<T> = Result<T, PipewrightError>;

/// Coarse classification of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid pipeline definition; nothing runs
    Config,
    /// Cycle or unresolved dependency; nothing runs
    Graph,
    /// Workspace could not be created or removed
    Workspace,
    /// A command ran and exited unsuccessfully, or could not be spawned
    Execution,
    /// A command exceeded its deadline
    Timeout,
    /// The run was cancelled
    Cancelled,
    /// Any other IO problem
    Io,
}

impl ErrorKind {
    /// Whether a stage attempt failing with this kind may be retried
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Execution | Self::Timeout)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::Graph => write!(f, "graph"),
            Self::Workspace => write!(f, "workspace"),
            Self::Execution => write!(f, "execution"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Io => write!(f, "io"),
        }
    }
}

/// Main error type for pipewright
#[derive(Error, Debug, Diagnostic)]
pub enum PipewrightError {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline file not found: {path}")]
    #[diagnostic(
        code(pipewright::pipeline_not_found),
        help("Pass the pipeline file with --pipeline or create pipewright.yaml")
    )]
    PipelineNotFound { path: PathBuf },

    #[error("Invalid pipeline configuration: {reason}")]
    #[diagnostic(code(pipewright::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Stage '{stage}' is invalid: {reason}")]
    #[diagnostic(code(pipewright::invalid_stage))]
    InvalidStage { stage: String, reason: String },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(pipewright::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(pipewright::yaml_error))]
    Yaml { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(pipewright::toml_error))]
    Toml { message: String },

    #[error("JSON error: {message}")]
    #[diagnostic(code(pipewright::json_error))]
    Json { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Graph Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Circular dependency detected between stages: {}", stages.join(", "))]
    #[diagnostic(
        code(pipewright::circular_dependency),
        help("Review your stage dependencies to remove the cycle")
    )]
    CircularDependency { stages: Vec<String> },

    #[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
    #[diagnostic(
        code(pipewright::unknown_dependency),
        help("Check that '{dependency}' is defined in your pipeline")
    )]
    UnknownDependency { stage: String, dependency: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Workspace Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to create workspace '{path}': {error}")]
    #[diagnostic(
        code(pipewright::workspace_create),
        help("Check permissions and free space under the workspace root")
    )]
    WorkspaceCreate { path: PathBuf, error: String },

    #[error("Failed to remove workspace '{path}': {error}")]
    #[diagnostic(code(pipewright::workspace_remove))]
    WorkspaceRemove { path: PathBuf, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Stage '{stage}' exited with code {exit_code}")]
    #[diagnostic(code(pipewright::stage_failed))]
    CommandFailed { stage: String, exit_code: i32 },

    #[error("Stage '{stage}' could not start '{program}': {error}")]
    #[diagnostic(code(pipewright::spawn_failed))]
    SpawnFailed {
        stage: String,
        program: String,
        error: String,
        #[help]
        help: Option<String>,
    },

    #[error("Stage '{stage}' timed out after {}s", timeout.as_secs_f64())]
    #[diagnostic(
        code(pipewright::timeout),
        help("Raise timeout_secs on the stage or the pipeline default")
    )]
    Timeout { stage: String, timeout: Duration },

    #[error("Stage '{stage}' was cancelled")]
    #[diagnostic(code(pipewright::cancelled))]
    Cancelled { stage: String },

    #[error("Stage '{stage}' panicked: {message}")]
    #[diagnostic(code(pipewright::stage_panicked))]
    StagePanicked { stage: String, message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(pipewright::io_error))]
    Io { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(pipewright::glob_error))]
    GlobPattern { message: String },
}

impl From<std::io::Error> for PipewrightError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for PipewrightError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for PipewrightError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for PipewrightError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<glob::PatternError> for PipewrightError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl PipewrightError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PipelineNotFound { .. }
            | Self::InvalidPipeline { .. }
            | Self::InvalidStage { .. }
            | Self::FileReadError { .. }
            | Self::Yaml { .. }
            | Self::Toml { .. }
            | Self::Json { .. } => ErrorKind::Config,
            Self::CircularDependency { .. } | Self::UnknownDependency { .. } => ErrorKind::Graph,
            Self::WorkspaceCreate { .. } | Self::WorkspaceRemove { .. } => ErrorKind::Workspace,
            Self::CommandFailed { .. } | Self::SpawnFailed { .. } | Self::StagePanicked { .. } => {
                ErrorKind::Execution
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Io { .. } | Self::GlobPattern { .. } => ErrorKind::Io,
        }
    }

    /// Collapse a list of validation messages into a single config error
    pub fn invalid_pipeline(errors: &[String]) -> Self {
        let reason = match errors {
            [single] => single.clone(),
            _ => format!("{} problems found", errors.len()),
        };
        let help = if errors.len() > 1 {
            Some(errors.join("\n"))
        } else {
            None
        };
        Self::InvalidPipeline { reason, help }
    }

    /// Create a spawn failure with a hint for missing programs
    pub fn spawn_failed(stage: &str, program: &str, error: &std::io::Error) -> Self {
        let help = match error.kind() {
            std::io::ErrorKind::NotFound => {
                Some(format!("Install '{}' and ensure it's in your PATH", program))
            }
            std::io::ErrorKind::PermissionDenied => {
                Some(format!("'{}' is not executable by the current user", program))
            }
            _ => None,
        };

        Self::SpawnFailed {
            stage: stage.to_string(),
            program: program.to_string(),
            error: error.to_string(),
            help,
        }
    }
}
