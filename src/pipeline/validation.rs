// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Pipeline validation
//!
//! Validates pipeline configuration before execution. Structural problems
//! of the dependency graph (cycles, unknown stages) are reported here too so
//! `validate` can show everything at once, but the engine relies on
//! [`StageGraph::build`] for those.

use std::collections::HashSet;

use crate::errors::{PipewrightError, PipewrightResult};
use crate::pipeline::{Action, PipelineSpec, StageGraph, StageSpec};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline configuration
    pub fn validate(pipeline: &PipelineSpec) -> ValidationResult {
        let mut result = Self::validate_config(pipeline);

        // Graph problems only make sense once names are unique
        if result.is_valid() {
            match StageGraph::build(pipeline) {
                Ok(_) => {}
                Err(PipewrightError::CircularDependency { stages }) => {
                    result.add_error(&format!("Circular dependency: {}", stages.join(" → ")));
                }
                Err(PipewrightError::UnknownDependency { stage, dependency }) => {
                    result.add_error(&format!(
                        "Stage '{}' depends on unknown stage '{}'",
                        stage, dependency
                    ));
                }
                Err(e) => {
                    result.add_error(&format!("DAG validation error: {}", e));
                }
            }
        }

        result
    }

    /// Reject a pipeline with configuration errors
    ///
    /// Graph structure is not checked here.
    pub fn ensure_valid(pipeline: &PipelineSpec) -> PipewrightResult<ValidationResult> {
        let result = Self::validate_config(pipeline);
        if result.is_valid() {
            Ok(result)
        } else {
            Err(PipewrightError::invalid_pipeline(&result.errors))
        }
    }

    /// Checks that don't involve the dependency graph
    fn validate_config(pipeline: &PipelineSpec) -> ValidationResult {
        let mut result = ValidationResult::new();

        if pipeline.name.trim().is_empty() {
            result.add_error("Pipeline name is empty");
        }

        if pipeline.stages.is_empty() {
            result.add_error("Pipeline has no stages defined");
        }

        if pipeline.concurrency == 0 {
            result.add_error("Concurrency must be at least 1");
        }

        if pipeline.timeout_secs == 0 {
            result.add_error("Default timeout must be greater than zero");
        }

        for key in pipeline.env.keys() {
            if let Some(problem) = env_key_problem(key) {
                result.add_error(&format!("Environment variable '{}' {}", key, problem));
            }
        }

        // Check for duplicate stage names
        let mut seen_names = HashSet::new();
        for stage in &pipeline.stages {
            if !seen_names.insert(&stage.name) {
                result.add_error(&format!("Duplicate stage name: '{}'", stage.name));
            }
        }

        let checkouts = pipeline.stages.iter().filter(|s| s.is_checkout()).count();
        if checkouts > 1 {
            result.add_warning(&format!(
                "{} checkout stages clone into the same workspace",
                checkouts
            ));
        }

        for stage in &pipeline.stages {
            Self::validate_stage(stage, pipeline, &mut result);
        }

        result
    }

    /// Validate a single stage
    fn validate_stage(stage: &StageSpec, pipeline: &PipelineSpec, result: &mut ValidationResult) {
        if stage.name.trim().is_empty() {
            result.add_error("Stage with an empty name");
        }

        match &stage.action {
            Action::Command { program, .. } => {
                if program.trim().is_empty() {
                    result.add_error(&format!("Stage '{}': program is empty", stage.name));
                }
            }
            Action::Checkout => {
                let has_repo = pipeline
                    .repository
                    .as_deref()
                    .is_some_and(|url| !url.trim().is_empty());
                if !has_repo {
                    result.add_error(&format!(
                        "Stage '{}': checkout requires a pipeline repository",
                        stage.name
                    ));
                }
                if !stage.depends_on.is_empty() {
                    result.add_warning(&format!(
                        "Stage '{}': checkout runs after other stages and will clone into a used workspace",
                        stage.name
                    ));
                }
            }
        }

        let mut seen_deps = HashSet::new();
        for dep in &stage.depends_on {
            if !seen_deps.insert(dep) {
                result.add_warning(&format!(
                    "Stage '{}': dependency '{}' listed more than once",
                    stage.name, dep
                ));
            }
        }

        for key in stage.env.keys() {
            if let Some(problem) = env_key_problem(key) {
                result.add_error(&format!(
                    "Stage '{}': environment variable '{}' {}",
                    stage.name, key, problem
                ));
            }
        }
    }
}

fn env_key_problem(key: &str) -> Option<&'static str> {
    if key.is_empty() {
        Some("has an empty name")
    } else if key.contains('=') {
        Some("contains '='")
    } else if key.contains('\0') {
        Some("contains a NUL byte")
    } else {
        None
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
