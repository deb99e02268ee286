// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! DAG scheduler
//!
//! Starts every stage whose dependencies have all succeeded, up to the
//! concurrency limit, in declaration order. A stage that does not succeed
//! takes everything downstream of it out of the run.
//!
//! Per-stage bookkeeping lives in one arena indexed by the stage's position
//! in the graph. Workers only ever write their own slot.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::errors::PipewrightError;
use crate::pipeline::stage::{execute_stage, RunContext, StageOutcome};
use crate::pipeline::{StageGraph, StageResult, StageStatus};

/// What the scheduler hands back once nothing is left to run
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    /// Every stage's result, in the order the stages reached a terminal status
    pub results: Vec<StageResult>,

    /// Whether the run was cancelled before it finished
    pub cancelled: bool,
}

/// Runs the stages of one graph
pub struct Scheduler {
    graph: Arc<StageGraph>,
    concurrency: usize,
}

impl Scheduler {
    /// Scheduler running at most `concurrency` stages at once
    ///
    /// A limit of zero is treated as one.
    pub fn new(graph: Arc<StageGraph>, concurrency: usize) -> Self {
        Self {
            graph,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every stage to a terminal status
    pub async fn run(&self, ctx: Arc<RunContext>) -> ScheduleOutcome {
        let graph = &self.graph;
        let ledger = Arc::new(Mutex::new(Ledger::new(&ctx)));

        let mut unmet: Vec<usize> = (0..graph.len())
            .map(|idx| graph.dependencies(idx).len())
            .collect();
        let mut ready: BTreeSet<usize> = (0..graph.len()).filter(|idx| unmet[*idx] == 0).collect();
        let mut workers: JoinSet<(usize, StageStatus)> = JoinSet::new();
        let mut cancelled = false;

        loop {
            if !cancelled && ctx.cancel.is_cancelled() {
                cancelled = true;
                ready.clear();
                let count = ledger.lock().await.cancel_pending();
                info!(run_id = %ctx.run_id, pending = count, "run cancelled");
            }

            while workers.len() < self.concurrency {
                let Some(idx) = ready.pop_first() else {
                    break;
                };

                if !ledger.lock().await.start(idx) {
                    continue;
                }

                info!(run_id = %ctx.run_id, stage = %graph.name(idx), "stage started");
                workers.spawn(guarded_worker(ctx.clone(), ledger.clone(), idx));
            }

            if workers.is_empty() {
                break;
            }

            tokio::select! {
                joined = workers.join_next() => match joined {
                    Some(Ok((idx, status))) => {
                        self.on_finished(&ctx, &ledger, idx, status, &mut unmet, &mut ready).await;
                    }
                    Some(Err(e)) => error!(error = %e, "stage worker aborted"),
                    None => break,
                },
                _ = ctx.cancel.cancelled(), if !cancelled => {}
            }
        }

        let mut ledger = ledger.lock().await;
        ledger.settle(cancelled);

        ScheduleOutcome {
            results: ledger.completion_order(),
            cancelled,
        }
    }

    async fn on_finished(
        &self,
        ctx: &RunContext,
        ledger: &Mutex<Ledger>,
        idx: usize,
        status: StageStatus,
        unmet: &mut [usize],
        ready: &mut BTreeSet<usize>,
    ) {
        let graph = &self.graph;
        info!(run_id = %ctx.run_id, stage = %graph.name(idx), status = %status, "stage finished");

        if status == StageStatus::Succeeded {
            for dep in graph.dependents(idx) {
                unmet[dep] -= 1;
                if unmet[dep] == 0 && !ctx.cancel.is_cancelled() {
                    ready.insert(dep);
                }
            }
            return;
        }

        let next = if ctx.cancel.is_cancelled() {
            StageStatus::Cancelled
        } else {
            StageStatus::Skipped
        };
        let reason = format!("dependency '{}' {}", graph.name(idx), status);

        let mut ledger = ledger.lock().await;
        for downstream in graph.transitive_dependents(idx) {
            if ledger.finish(downstream, next, Some(reason.clone())) {
                debug!(stage = %graph.name(downstream), status = %next, reason = %reason, "stage not run");
            }
        }
    }
}

/// Run one stage on its own task so a panic fails the stage, not the run
async fn guarded_worker(
    ctx: Arc<RunContext>,
    ledger: Arc<Mutex<Ledger>>,
    idx: usize,
) -> (usize, StageStatus) {
    let mut inner = {
        let ctx = ctx.clone();
        let ledger = ledger.clone();
        AbortOnDrop(tokio::spawn(async move {
            let outcome = execute_stage(&ctx, &ctx.spec.stages[idx]).await;
            let status = outcome.status;
            ledger.lock().await.complete(idx, outcome);
            status
        }))
    };

    match (&mut inner.0).await {
        Ok(status) => (idx, status),
        Err(e) => {
            let message = panic_message(&ctx.spec.stages[idx].name, e);
            warn!(run_id = %ctx.run_id, stage = %ctx.spec.stages[idx].name, error = %message, "stage panicked");
            ledger
                .lock()
                .await
                .finish(idx, StageStatus::Failed, Some(message));
            (idx, StageStatus::Failed)
        }
    }
}

fn panic_message(stage: &str, e: tokio::task::JoinError) -> String {
    if !e.is_panic() {
        return format!("stage task aborted: {}", e);
    }

    let payload = e.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    PipewrightError::StagePanicked {
        stage: stage.to_string(),
        message,
    }
    .to_string()
}

/// Aborts the wrapped task when dropped
///
/// Keeps a stage's child process from outliving an abandoned run.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Arena of stage results plus the order they finished in
struct Ledger {
    slots: Vec<StageResult>,
    completed: Vec<usize>,
}

impl Ledger {
    fn new(ctx: &RunContext) -> Self {
        let slots = ctx
            .spec
            .stages
            .iter()
            .map(|s| StageResult::pending(s.name.clone(), !s.allow_failure))
            .collect();

        Self {
            slots,
            completed: Vec::new(),
        }
    }

    /// Pending to Running
    fn start(&mut self, idx: usize) -> bool {
        self.slots[idx].advance(StageStatus::Running)
    }

    /// Move a stage to a terminal status without running it further
    fn finish(&mut self, idx: usize, status: StageStatus, error: Option<String>) -> bool {
        let slot = &mut self.slots[idx];
        if !slot.advance(status) {
            return false;
        }
        if slot.error.is_none() {
            slot.error = error;
        }
        self.completed.push(idx);
        true
    }

    /// Record the outcome of a stage that ran
    fn complete(&mut self, idx: usize, outcome: StageOutcome) {
        if outcome.apply(&mut self.slots[idx]) {
            self.completed.push(idx);
        }
    }

    fn cancel_pending(&mut self) -> usize {
        let pending: Vec<usize> = (0..self.slots.len())
            .filter(|idx| self.slots[*idx].status == StageStatus::Pending)
            .collect();

        for idx in &pending {
            self.finish(*idx, StageStatus::Cancelled, Some("run cancelled".to_string()));
        }
        pending.len()
    }

    /// Give every stage still in flight a terminal status
    fn settle(&mut self, cancelled: bool) {
        for idx in 0..self.slots.len() {
            match self.slots[idx].status {
                StageStatus::Pending => {
                    let status = if cancelled {
                        StageStatus::Cancelled
                    } else {
                        StageStatus::Skipped
                    };
                    self.finish(idx, status, Some("never became ready".to_string()));
                }
                StageStatus::Running => {
                    self.finish(idx, StageStatus::Failed, Some("stage worker lost".to_string()));
                }
                _ => {}
            }
        }
    }

    fn completion_order(&self) -> Vec<StageResult> {
        self.completed
            .iter()
            .map(|idx| self.slots[*idx].clone())
            .collect()
    }
}
