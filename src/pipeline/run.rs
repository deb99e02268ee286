// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Pipeline runs
//!
//! Ties the pieces together for one execution: validate the pipeline, build
//! its graph, allocate a workspace, schedule the stages, keep the artifacts
//! and remove the workspace again.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::errors::PipewrightResult;
use crate::executors::{CommandExecutor, GitClient, NullSink, OutputSink, VcsClient};
use crate::pipeline::scheduler::Scheduler;
use crate::pipeline::stage::RunContext;
use crate::pipeline::{
    PipelineSpec, PipelineValidator, RunId, RunReport, RunStatus, StageGraph,
};
use crate::workspace::{collect_artifacts, ArtifactRecord, WorkspaceManager};

/// Executes pipelines
///
/// One runner can execute any number of pipelines, one after another or
/// concurrently; every call gets its own run id and workspace.
pub struct PipelineRunner {
    executor: Arc<dyn CommandExecutor>,
    vcs: Arc<dyn VcsClient>,
    sink: Arc<dyn OutputSink>,
    workspaces: WorkspaceManager,
    artifacts_dir: Option<PathBuf>,
    concurrency: Option<usize>,
}

impl PipelineRunner {
    /// Runner using `executor` for every command, git for checkouts and
    /// workspaces under the system temp directory
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            vcs: Arc::new(GitClient::new()),
            sink: Arc::new(NullSink),
            workspaces: WorkspaceManager::new(),
            artifacts_dir: None,
            concurrency: None,
        }
    }

    pub fn with_vcs(mut self, vcs: Arc<dyn VcsClient>) -> Self {
        self.vcs = vcs;
        self
    }

    /// Receive stage output as it is produced
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_workspaces(mut self, workspaces: WorkspaceManager) -> Self {
        self.workspaces = workspaces;
        self
    }

    /// Copy artifacts into `dir/<run id>` before the workspace goes away
    ///
    /// Without a directory, artifact patterns are ignored.
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    /// Override the pipeline's own concurrency limit
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Run a pipeline to completion
    pub async fn execute(&self, pipeline: &PipelineSpec) -> PipewrightResult<RunReport> {
        self.execute_with_cancel(pipeline, CancelToken::new()).await
    }

    /// Run a pipeline, stopping early once `cancel` fires
    ///
    /// Configuration and graph errors are returned before anything runs.
    /// Once stages start, their failures end up in the report rather than
    /// in the error.
    pub async fn execute_with_cancel(
        &self,
        pipeline: &PipelineSpec,
        cancel: CancelToken,
    ) -> PipewrightResult<RunReport> {
        let validation = PipelineValidator::ensure_valid(pipeline)?;
        for warning in &validation.warnings {
            warn!(pipeline = %pipeline.name, "{}", warning);
        }

        let graph = Arc::new(StageGraph::build(pipeline)?);
        let run_id = RunId::new();
        let started_at = Utc::now();
        let clock = Instant::now();

        let workspace = self.workspaces.acquire(&run_id)?;
        info!(
            run_id = %run_id,
            pipeline = %pipeline.name,
            stages = graph.len(),
            workspace = %workspace.path().display(),
            "run started"
        );

        let ctx = Arc::new(RunContext {
            run_id,
            spec: Arc::new(pipeline.clone()),
            workspace: workspace.path().to_path_buf(),
            executor: self.executor.clone(),
            vcs: self.vcs.clone(),
            sink: self.sink.clone(),
            cancel,
        });

        let concurrency = self.concurrency.unwrap_or(pipeline.concurrency);
        let outcome = Scheduler::new(graph, concurrency).run(ctx).await;

        let artifacts = self.keep_artifacts(&run_id, pipeline, workspace.path());

        let status = RunStatus::from_results(&outcome.results, outcome.cancelled);
        let report = RunReport {
            run_id,
            pipeline: pipeline.name.clone(),
            status,
            stages: outcome.results,
            started_at,
            finished_at: Utc::now(),
            duration: clock.elapsed(),
            artifacts,
        };

        if let Err(e) = workspace.release() {
            error!(run_id = %run_id, status = %report.status, error = %e, "workspace cleanup failed");
            return Err(e);
        }

        info!(
            run_id = %run_id,
            status = %report.status,
            duration_ms = report.duration.as_millis() as u64,
            "run finished"
        );

        Ok(report)
    }

    fn keep_artifacts(
        &self,
        run_id: &RunId,
        pipeline: &PipelineSpec,
        workspace: &Path,
    ) -> Vec<ArtifactRecord> {
        let Some(dir) = &self.artifacts_dir else {
            return Vec::new();
        };
        if pipeline.artifacts.is_empty() {
            return Vec::new();
        }

        let dest = dir.join(run_id.to_string());
        match collect_artifacts(workspace, &pipeline.artifacts, &dest) {
            Ok(records) => {
                info!(run_id = %run_id, count = records.len(), dest = %dest.display(), "artifacts collected");
                records
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "artifact collection failed");
                Vec::new()
            }
        }
    }
}
