// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Pipeline definition structures
//!
//! Defines the schema for pipeline files. A [`PipelineSpec`] is immutable
//! once loaded; the engine shares it behind an `Arc` for the length of a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::errors::{PipewrightError, PipewrightResult};
use crate::pipeline::legacy::LegacyConfig;

/// Pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Pipeline version (for future compatibility)
    #[serde(default = "default_version")]
    pub version: String,

    /// Pipeline name
    pub name: String,

    /// Pipeline description
    #[serde(default)]
    pub description: Option<String>,

    /// Repository URL cloned by checkout stages
    #[serde(default)]
    pub repository: Option<String>,

    /// Branch cloned by checkout stages
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Stages; declaration order breaks scheduling ties
    pub stages: Vec<StageSpec>,

    /// Global environment overlay
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Default stage timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of stages running at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Upper bound for the delay between retry attempts, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Glob patterns, relative to the workspace, of files to keep after the run
    #[serde(default)]
    pub artifacts: Vec<String>,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_concurrency() -> usize {
    4
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_backoff_ms() -> u64 {
    1_000
}

impl PipelineSpec {
    /// Create a pipeline with default settings
    pub fn new(name: impl Into<String>, stages: Vec<StageSpec>) -> Self {
        Self {
            version: default_version(),
            name: name.into(),
            description: None,
            repository: None,
            branch: default_branch(),
            stages,
            env: HashMap::new(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            max_backoff_ms: default_max_backoff_ms(),
            artifacts: Vec::new(),
        }
    }

    /// Set the repository cloned by checkout stages
    pub fn with_repository(mut self, url: impl Into<String>, branch: impl Into<String>) -> Self {
        self.repository = Some(url.into());
        self.branch = branch.into();
        self
    }

    /// Set the concurrency limit
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Add a global environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Load a pipeline from a YAML or TOML file
    ///
    /// Files ending in `.toml` are read as TOML, anything else as YAML. YAML
    /// files in the flat legacy layout (`build_cmd`, `test_cmd`, ...) are
    /// converted into the equivalent linear pipeline.
    pub fn from_file(path: &Path) -> PipewrightResult<Self> {
        if !path.exists() {
            return Err(PipewrightError::PipelineNotFound {
                path: path.to_path_buf(),
            });
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| PipewrightError::FileReadError {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Parse a pipeline from a YAML string
    pub fn from_yaml(yaml: &str) -> PipewrightResult<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;

        if LegacyConfig::matches(&value) {
            let legacy: LegacyConfig = serde_yaml::from_value(value)?;
            return Ok(legacy.into_pipeline());
        }

        serde_yaml::from_value(value).map_err(Into::into)
    }

    /// Parse a pipeline from a TOML string
    pub fn from_toml(content: &str) -> PipewrightResult<Self> {
        toml::from_str(content).map_err(Into::into)
    }

    /// Serialize pipeline to YAML
    pub fn to_yaml(&self) -> PipewrightResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Get a stage by name
    pub fn get_stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Get all stage names
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Default timeout applied to stages that don't set one
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Cap on the delay between retry attempts
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Effective timeout of a stage
    pub fn stage_timeout(&self, stage: &StageSpec) -> Duration {
        if stage.timeout_secs == 0 {
            self.default_timeout()
        } else {
            Duration::from_secs(stage.timeout_secs)
        }
    }

    /// Environment overlay for a stage (stage keys win over global ones)
    pub fn stage_env(&self, stage: &StageSpec) -> HashMap<String, String> {
        let mut env = self.env.clone();
        env.extend(stage.env.clone());
        env
    }

    /// Whether any stage uses the built-in checkout action
    pub fn has_checkout(&self) -> bool {
        self.stages.iter().any(StageSpec::is_checkout)
    }
}

/// A single pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    /// Stage name (must be unique within pipeline)
    pub name: String,

    /// Stage description
    #[serde(default)]
    pub description: Option<String>,

    /// What the stage does
    pub action: Action,

    /// Stage dependencies (other stage names)
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Environment variables for this stage
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Timeout in seconds (0 inherits the pipeline default)
    #[serde(default)]
    pub timeout_secs: u64,

    /// A failure of this stage alone does not fail the run
    #[serde(default)]
    pub allow_failure: bool,
}

impl StageSpec {
    /// Stage running an external program
    pub fn command<I, S>(name: impl Into<String>, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_action(
            name,
            Action::Command {
                program: program.into(),
                args: args.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// Stage cloning the pipeline repository into the workspace
    pub fn checkout(name: impl Into<String>) -> Self {
        Self::with_action(name, Action::Checkout)
    }

    fn with_action(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            description: None,
            action,
            depends_on: Vec::new(),
            env: HashMap::new(),
            retry: RetryPolicy::default(),
            timeout_secs: 0,
            allow_failure: false,
        }
    }

    /// Declare dependencies
    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, count: u32, backoff: Duration) -> Self {
        self.retry = RetryPolicy {
            count,
            backoff_ms: backoff.as_millis() as u64,
        };
        self
    }

    /// Set the timeout in seconds
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Add a stage environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Mark the stage as not required for overall success
    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    /// Whether this stage is the built-in checkout
    pub fn is_checkout(&self) -> bool {
        matches!(self.action, Action::Checkout)
    }

    /// Short label for the action, used in plans and graphs
    pub fn action_label(&self) -> String {
        match &self.action {
            Action::Checkout => "checkout".to_string(),
            Action::Command { program, args } if args.is_empty() => program.clone(),
            Action::Command { program, args } => format!("{} {}", program, args.join(" ")),
        }
    }
}

/// What a stage runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// External program with an explicit argument vector
    Command {
        /// Program name or path
        program: String,

        /// Arguments, passed verbatim
        #[serde(default)]
        args: Vec<String>,
    },

    /// Clone the pipeline repository into the workspace
    Checkout,
}

/// Retry policy for a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    #[serde(default)]
    pub count: u32,

    /// Base delay before the first retry, in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            count: 0,
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Total number of attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.count.saturating_add(1)
    }

    /// Delay to wait after `failed_attempt` (1-based) before trying again
    ///
    /// Doubles with each failed attempt and never exceeds `cap`.
    pub fn backoff_after(&self, failed_attempt: u32, cap: Duration) -> Duration {
        let base = Duration::from_millis(self.backoff_ms);
        let factor = 1u32
            .checked_shl(failed_attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        base.saturating_mul(factor).min(cap)
    }
}
