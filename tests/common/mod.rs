// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, EnvFilter};

use pipewright::executors::{CommandFailure, CommandOutput, GitClient};
use pipewright::{
    CancelToken, CommandExecutor, Invocation, OutputSink, PipelineRunner, PipewrightError,
    WorkspaceManager,
};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Logs are captured per test and only shown for failures. Enable levels
/// with e.g. `PIPEWRIGHT_LOG=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env("PIPEWRIGHT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// How the spy answers invocations of a stage
#[derive(Debug, Clone)]
pub enum Behaviour {
    Succeed,
    /// Exit with this code every time
    Fail(i32),
    /// Exit 1 for the first `n` calls, then succeed
    FailTimes(u32),
    /// Report a timeout every time
    TimeOut,
    /// Block until the run is cancelled
    Hang,
}

/// One invocation the spy saw
#[derive(Debug, Clone)]
pub struct Call {
    pub stage: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: PathBuf,
    pub started: Instant,
    pub finished: Instant,
}

/// Fake executor recording every call instead of spawning processes
pub struct SpyExecutor {
    behaviours: HashMap<String, Behaviour>,
    delay: Duration,
    calls: Mutex<Vec<Call>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl SpyExecutor {
    pub fn new() -> Self {
        Self {
            behaviours: HashMap::new(),
            delay: Duration::from_millis(5),
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, stage: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(stage.to_string(), behaviour);
        self
    }

    /// How long every call takes
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, stage: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.stage == stage).collect()
    }

    pub fn invoked(&self, stage: &str) -> bool {
        !self.calls_for(stage).is_empty()
    }

    /// Highest number of calls in flight at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn previous_calls(&self, stage: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.stage == stage)
            .count() as u32
    }

    fn output(code: i32, stage: &str) -> CommandOutput {
        CommandOutput {
            exit_code: Some(code),
            output: format!("{} exited {}\n", stage, code),
            duration: Duration::from_millis(1),
        }
    }
}

#[async_trait]
impl CommandExecutor for SpyExecutor {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: &dyn OutputSink,
        cancel: &CancelToken,
    ) -> Result<CommandOutput, CommandFailure> {
        let started = Instant::now();
        let earlier = self.previous_calls(&invocation.stage);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let behaviour = self
            .behaviours
            .get(&invocation.stage)
            .cloned()
            .unwrap_or(Behaviour::Succeed);

        let result = match behaviour {
            Behaviour::Hang => {
                cancel.cancelled().await;
                Err(CommandFailure::new(
                    PipewrightError::Cancelled {
                        stage: invocation.stage.clone(),
                    },
                    CommandOutput::default(),
                ))
            }
            other => {
                tokio::time::sleep(self.delay).await;
                sink.line(
                    &invocation.stage,
                    pipewright::executors::OutputStream::Stdout,
                    &format!("running {}", invocation.program),
                );
                match other {
                    Behaviour::Fail(code) => Err(CommandFailure::new(
                        PipewrightError::CommandFailed {
                            stage: invocation.stage.clone(),
                            exit_code: code,
                        },
                        Self::output(code, &invocation.stage),
                    )),
                    Behaviour::FailTimes(n) if earlier < n => Err(CommandFailure::new(
                        PipewrightError::CommandFailed {
                            stage: invocation.stage.clone(),
                            exit_code: 1,
                        },
                        Self::output(1, &invocation.stage),
                    )),
                    Behaviour::TimeOut => Err(CommandFailure::new(
                        PipewrightError::Timeout {
                            stage: invocation.stage.clone(),
                            timeout: invocation.timeout,
                        },
                        CommandOutput::default(),
                    )),
                    _ => Ok(Self::output(0, &invocation.stage)),
                }
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            stage: invocation.stage.clone(),
            program: invocation.program.clone(),
            args: invocation.args.clone(),
            env: invocation.env.clone(),
            working_dir: invocation.working_dir.clone(),
            started,
            finished: Instant::now(),
        });

        result
    }
}

/// Sink collecting `(stage, line)` pairs
#[derive(Default)]
pub struct CollectingSink {
    pub lines: Mutex<Vec<(String, String)>>,
}

impl OutputSink for CollectingSink {
    fn line(&self, stage: &str, _stream: pipewright::executors::OutputStream, line: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((stage.to_string(), line.to_string()));
    }
}

impl CollectingSink {
    pub fn lines_for(&self, stage: &str) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == stage)
            .map(|(_, l)| l.clone())
            .collect()
    }
}

/// Runner over `executor` with workspaces under `root/ws`
pub fn runner(root: &Path, executor: Arc<dyn CommandExecutor>) -> PipelineRunner {
    PipelineRunner::new(executor)
        .with_vcs(Arc::new(GitClient::with_program("git")))
        .with_workspaces(WorkspaceManager::with_root(root.join("ws")))
}

/// Number of entries left under the workspace root
pub fn leftover_workspaces(root: &Path) -> usize {
    std::fs::read_dir(root.join("ws"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}
