// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Stage execution
//!
//! Runs one stage to a terminal status: builds the command (or the clone
//! for checkout stages), runs it through the executor and retries timeouts
//! and non-zero exits with exponential backoff.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::errors::{ErrorKind, PipewrightError, PipewrightResult};
use crate::executors::{CommandExecutor, Invocation, OutputSink, VcsClient};
use crate::pipeline::{
    Action, AttemptOutcome, AttemptRecord, PipelineSpec, RunId, StageResult, StageSpec,
    StageStatus,
};
use crate::workspace::clear_dir;

/// Everything the stages of one run share
///
/// Lives exactly as long as the run; nothing here outlives it.
pub struct RunContext {
    pub run_id: RunId,
    pub spec: Arc<PipelineSpec>,
    pub workspace: PathBuf,
    pub executor: Arc<dyn CommandExecutor>,
    pub vcs: Arc<dyn VcsClient>,
    pub sink: Arc<dyn OutputSink>,
    pub cancel: CancelToken,
}

/// What running a stage produced
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub status: StageStatus,
    pub attempts: Vec<AttemptRecord>,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error: Option<String>,
}

impl StageOutcome {
    fn new() -> Self {
        Self {
            status: StageStatus::Running,
            attempts: Vec::new(),
            exit_code: None,
            output: String::new(),
            error: None,
        }
    }

    fn finish(mut self, status: StageStatus, error: Option<String>) -> Self {
        self.status = status;
        self.error = error;
        self
    }

    /// Copy the outcome into a running stage's result
    ///
    /// Returns `false` if the result could not take the final status.
    pub fn apply(self, result: &mut StageResult) -> bool {
        if !result.advance(self.status) {
            return false;
        }
        result.attempts = self.attempts.len() as u32;
        result.attempt_log = self.attempts;
        result.exit_code = self.exit_code;
        result.output = self.output;
        result.error = self.error;
        true
    }
}

/// Run a stage until it succeeds, runs out of attempts or is cancelled
pub async fn execute_stage(ctx: &RunContext, stage: &StageSpec) -> StageOutcome {
    let policy = stage.retry;
    let max_attempts = policy.max_attempts();
    let cap = ctx.spec.max_backoff();
    let mut outcome = StageOutcome::new();

    let invocation = match build_invocation(ctx, stage) {
        Ok(inv) => inv,
        Err(e) => return outcome.finish(StageStatus::Failed, Some(e.to_string())),
    };

    for attempt in 1..=max_attempts {
        let mut backoff = Duration::ZERO;

        if attempt > 1 {
            backoff = policy.backoff_after(attempt - 1, cap);
            debug!(stage = %stage.name, attempt, backoff_ms = backoff.as_millis() as u64, "waiting before retry");

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = ctx.cancel.cancelled() => {
                    let error = PipewrightError::Cancelled { stage: stage.name.clone() };
                    return outcome.finish(StageStatus::Cancelled, Some(error.to_string()));
                }
            }

            // A failed clone leaves a partial tree that git refuses to clone over
            if stage.is_checkout() {
                if let Err(e) = clear_dir(&ctx.workspace) {
                    return outcome.finish(StageStatus::Failed, Some(e.to_string()));
                }
            }
        }

        if ctx.cancel.is_cancelled() {
            let error = PipewrightError::Cancelled { stage: stage.name.clone() };
            return outcome.finish(StageStatus::Cancelled, Some(error.to_string()));
        }

        debug!(stage = %stage.name, attempt, max_attempts, "starting attempt");

        match ctx
            .executor
            .run(&invocation, ctx.sink.as_ref(), &ctx.cancel)
            .await
        {
            Ok(out) => {
                outcome.attempts.push(AttemptRecord {
                    attempt,
                    outcome: AttemptOutcome::Succeeded,
                    exit_code: out.exit_code,
                    duration: out.duration,
                    backoff,
                    error: None,
                });
                outcome.exit_code = out.exit_code;
                outcome.output = out.output;
                return outcome.finish(StageStatus::Succeeded, None);
            }
            Err(failure) => {
                let kind = failure.error.kind();
                let message = failure.error.to_string();

                outcome.attempts.push(AttemptRecord {
                    attempt,
                    outcome: attempt_outcome(kind),
                    exit_code: failure.output.exit_code,
                    duration: failure.output.duration,
                    backoff,
                    error: Some(message.clone()),
                });
                outcome.exit_code = failure.output.exit_code;
                outcome.output = failure.output.output;

                if kind == ErrorKind::Cancelled {
                    return outcome.finish(StageStatus::Cancelled, Some(message));
                }

                if !kind.is_retryable() || attempt == max_attempts {
                    info!(stage = %stage.name, attempts = attempt, error = %message, "stage failed");
                    return outcome.finish(StageStatus::Failed, Some(message));
                }

                warn!(
                    stage = %stage.name,
                    attempt,
                    max_attempts,
                    error = %message,
                    "attempt failed; retrying"
                );
            }
        }
    }

    // Only reachable with zero attempts, which `max_attempts` rules out
    outcome.finish(StageStatus::Failed, Some("no attempts made".to_string()))
}

fn attempt_outcome(kind: ErrorKind) -> AttemptOutcome {
    match kind {
        ErrorKind::Timeout => AttemptOutcome::TimedOut,
        ErrorKind::Cancelled => AttemptOutcome::Cancelled,
        _ => AttemptOutcome::Failed,
    }
}

/// Build the command a stage runs
///
/// Environment precedence, lowest first: run variables, VCS defaults, the
/// pipeline's global overlay, the stage's overlay. The current process
/// environment sits beneath all of them.
pub fn build_invocation(ctx: &RunContext, stage: &StageSpec) -> PipewrightResult<Invocation> {
    let mut invocation = match &stage.action {
        Action::Command { program, args } => Invocation {
            stage: stage.name.clone(),
            program: program.clone(),
            args: args.clone(),
            working_dir: ctx.workspace.clone(),
            env: HashMap::new(),
            timeout: Duration::ZERO,
        },
        Action::Checkout => {
            let url = ctx
                .spec
                .repository
                .as_deref()
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| PipewrightError::InvalidStage {
                    stage: stage.name.clone(),
                    reason: "checkout requires a pipeline repository".to_string(),
                })?;
            ctx.vcs
                .clone_invocation(&stage.name, url, &ctx.spec.branch, &ctx.workspace)
        }
    };

    let mut env = HashMap::from([
        ("PIPEWRIGHT_RUN_ID".to_string(), ctx.run_id.to_string()),
        ("PIPEWRIGHT_PIPELINE".to_string(), ctx.spec.name.clone()),
        ("PIPEWRIGHT_STAGE".to_string(), stage.name.clone()),
        (
            "PIPEWRIGHT_WORKSPACE".to_string(),
            ctx.workspace.to_string_lossy().into_owned(),
        ),
    ]);
    env.extend(std::mem::take(&mut invocation.env));
    env.extend(ctx.spec.stage_env(stage));

    invocation.env = env;
    invocation.timeout = ctx.spec.stage_timeout(stage);
    Ok(invocation)
}
