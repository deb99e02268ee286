// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Flat single-job configuration
//!
//! Older pipeline files describe one fixed job: clone a repository, then run
//! optional build, test and deploy commands in sequence. These are converted
//! into a linear [`PipelineSpec`] so the engine only ever deals with graphs.

use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

use crate::pipeline::{PipelineSpec, StageSpec};

const LEGACY_KEYS: [&str; 4] = ["build_cmd", "test_cmd", "deploy_cmd", "environment"];

/// The flat job layout
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyConfig {
    pub name: String,

    #[serde(default)]
    pub repository: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default)]
    pub build_cmd: String,

    #[serde(default)]
    pub test_cmd: String,

    #[serde(default)]
    pub deploy_cmd: String,

    #[serde(default)]
    pub artifacts: Vec<String>,

    #[serde(default)]
    pub environment: HashMap<String, String>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl LegacyConfig {
    /// Whether a parsed document uses the flat layout
    pub fn matches(value: &serde_yaml::Value) -> bool {
        let Some(map) = value.as_mapping() else {
            return false;
        };

        if map.contains_key("stages") {
            return false;
        }

        LEGACY_KEYS.iter().any(|key| map.contains_key(*key))
    }

    /// Convert into a linear checkout → build → test → deploy pipeline
    ///
    /// Stages with an empty command are left out, and the remaining ones are
    /// chained so each depends on the previous one.
    pub fn into_pipeline(self) -> PipelineSpec {
        let mut stages: Vec<StageSpec> = Vec::new();

        if !self.repository.trim().is_empty() {
            stages.push(StageSpec::checkout("checkout"));
        }

        for (name, command) in [
            ("build", &self.build_cmd),
            ("test", &self.test_cmd),
            ("deploy", &self.deploy_cmd),
        ] {
            let Some(stage) = command_stage(name, command) else {
                continue;
            };

            let stage = match stages.last() {
                Some(prev) => stage.after([prev.name.clone()]),
                None => stage,
            };
            stages.push(stage);
        }

        let mut pipeline = PipelineSpec::new(self.name, stages);
        if !self.repository.trim().is_empty() {
            pipeline = pipeline.with_repository(self.repository, self.branch);
        } else {
            pipeline.branch = self.branch;
        }
        pipeline.env = self.environment;
        pipeline.artifacts = self.artifacts;
        pipeline
    }
}

/// Split a command line on whitespace
///
/// Quoting is not understood: `echo "a b"` becomes three arguments.
fn command_stage(name: &str, command: &str) -> Option<StageSpec> {
    let mut parts = command.split_whitespace();
    let program = parts.next()?;

    if command.contains('"') || command.contains('\'') {
        warn!(
            stage = name,
            command,
            "legacy command contains quotes; arguments are split on whitespace only"
        );
    }

    Some(StageSpec::command(name, program, parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Action;

    #[test]
    fn test_legacy_full_chain() {
        let yaml = r#"
name: "legacy"
repository: "https://example.com/app.git"
branch: "release"
build_cmd: "go build ./..."
test_cmd: "go test ./..."
deploy_cmd: "./deploy.sh production"
artifacts:
  - "bin/*"
environment:
  GOFLAGS: "-mod=vendor"
"#;

        let pipeline = PipelineSpec::from_yaml(yaml).unwrap();
        assert_eq!(pipeline.name, "legacy");
        assert_eq!(pipeline.repository.as_deref(), Some("https://example.com/app.git"));
        assert_eq!(pipeline.branch, "release");
        assert_eq!(pipeline.stage_names(), vec!["checkout", "build", "test", "deploy"]);
        assert_eq!(pipeline.env["GOFLAGS"], "-mod=vendor");
        assert_eq!(pipeline.artifacts, vec!["bin/*"]);

        let deploy = pipeline.get_stage("deploy").unwrap();
        assert_eq!(deploy.depends_on, vec!["test"]);
        assert_eq!(
            deploy.action,
            Action::Command {
                program: "./deploy.sh".into(),
                args: vec!["production".into()],
            }
        );
    }

    #[test]
    fn test_legacy_skips_empty_commands() {
        let yaml = r#"
name: "partial"
repository: "https://example.com/app.git"
build_cmd: "make"
test_cmd: ""
deploy_cmd: "make deploy"
"#;

        let pipeline = PipelineSpec::from_yaml(yaml).unwrap();
        assert_eq!(pipeline.stage_names(), vec!["checkout", "build", "deploy"]);
        assert_eq!(pipeline.get_stage("deploy").unwrap().depends_on, vec!["build"]);
    }

    #[test]
    fn test_legacy_without_repository() {
        let yaml = r#"
name: "local"
build_cmd: "make"
"#;

        let pipeline = PipelineSpec::from_yaml(yaml).unwrap();
        assert!(pipeline.repository.is_none());
        assert!(!pipeline.has_checkout());
        assert!(pipeline.get_stage("build").unwrap().depends_on.is_empty());
    }

    #[test]
    fn test_staged_document_is_not_legacy() {
        let value: serde_yaml::Value = serde_yaml::from_str(
            r#"
name: "modern"
environment: {}
stages: []
"#,
        )
        .unwrap();
        assert!(!LegacyConfig::matches(&value));
    }
}
