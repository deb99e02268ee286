// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Process executor
//!
//! Runs stage commands as child processes with an explicit argument vector.

use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{CommandExecutor, CommandFailure, CommandOutput, Invocation, OutputSink, OutputStream};
use crate::cancel::CancelToken;
use crate::errors::PipewrightError;

/// How long to keep reading pipes after the child is gone
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Executor spawning real OS processes
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    /// Time between the polite termination request and the kill on cancel
    grace_period: Duration,
}

impl ProcessExecutor {
    /// Create a process executor with a 5 second grace period
    pub fn new() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
        }
    }

    /// Set the grace period given to cancelled commands
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// How the wait loop ended
enum Exit {
    Status(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: &dyn OutputSink,
        cancel: &CancelToken,
    ) -> Result<CommandOutput, CommandFailure> {
        let start = Instant::now();

        if cancel.is_cancelled() {
            return Err(CommandFailure::new(
                PipewrightError::Cancelled {
                    stage: invocation.stage.clone(),
                },
                CommandOutput::default(),
            ));
        }

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so signals also reach whatever the command starts
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            CommandFailure::new(
                PipewrightError::spawn_failed(&invocation.stage, &invocation.program, &e),
                CommandOutput::default(),
            )
        })?;

        let pid = child.id();
        debug!(
            stage = %invocation.stage,
            program = %invocation.program,
            pid,
            "spawned command"
        );

        // Both pipes feed one channel so lines keep their arrival order
        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, OutputStream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, OutputStream::Stderr, tx.clone());
        }
        drop(tx);

        let mut output = String::new();
        let mut record = |stream: OutputStream, line: String| {
            sink.line(&invocation.stage, stream, &line);
            output.push_str(&line);
            output.push('\n');
        };

        let deadline = tokio::time::sleep(invocation.timeout);
        tokio::pin!(deadline);

        let exit = loop {
            tokio::select! {
                Some((stream, line)) = rx.recv() => record(stream, line),
                status = child.wait() => break Exit::Status(status),
                _ = &mut deadline => break Exit::TimedOut,
                _ = cancel.cancelled() => break Exit::Cancelled,
            }
        };

        match exit {
            Exit::TimedOut => {
                warn!(
                    stage = %invocation.stage,
                    timeout_secs = invocation.timeout.as_secs_f64(),
                    "command timed out; killing process"
                );
                signal_group(pid, "KILL", &invocation.stage).await;
                if let Err(e) = child.kill().await {
                    warn!(stage = %invocation.stage, error = %e, "failed to kill timed out process");
                }
            }
            Exit::Cancelled => {
                info!(stage = %invocation.stage, "cancellation requested; terminating process");
                self.terminate(&mut child, pid, &invocation.stage).await;
            }
            Exit::Status(_) => {}
        }

        // Pick up lines still buffered in the pipes
        while let Ok(Some((stream, line))) = tokio::time::timeout(DRAIN_TIMEOUT, rx.recv()).await {
            record(stream, line);
        }

        let exit_code = match &exit {
            Exit::Status(Ok(status)) => status.code(),
            _ => None,
        };
        let result = CommandOutput {
            exit_code,
            output,
            duration: start.elapsed(),
        };

        let error = match exit {
            Exit::Status(Ok(status)) if status.success() => return Ok(result),
            Exit::Status(Ok(status)) => PipewrightError::CommandFailed {
                stage: invocation.stage.clone(),
                exit_code: status.code().unwrap_or(-1),
            },
            Exit::Status(Err(e)) => PipewrightError::Io {
                message: format!("waiting for '{}': {}", invocation.program, e),
            },
            Exit::TimedOut => PipewrightError::Timeout {
                stage: invocation.stage.clone(),
                timeout: invocation.timeout,
            },
            Exit::Cancelled => PipewrightError::Cancelled {
                stage: invocation.stage.clone(),
            },
        };

        Err(CommandFailure::new(error, result))
    }
}

impl ProcessExecutor {
    /// Ask the process group to stop, then kill it once the grace period is over
    async fn terminate(&self, child: &mut Child, pid: Option<u32>, stage: &str) {
        signal_group(pid, "TERM", stage).await;

        match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(_) => debug!(stage, "process exited within grace period"),
            Err(_) => {
                warn!(stage, "process ignored termination request; killing");
                if let Err(e) = child.kill().await {
                    warn!(stage, error = %e, "failed to kill process");
                }
            }
        }

        // Descendants that outlived the leader
        signal_group(pid, "KILL", stage).await;
    }
}

/// Send `signal` to the process group led by `pid`
#[cfg(unix)]
async fn signal_group(pid: Option<u32>, signal: &str, stage: &str) {
    let Some(pid) = pid else {
        return;
    };

    let status = Command::new("kill")
        .arg(format!("-{signal}"))
        .arg("--")
        .arg(format!("-{pid}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    // A non-zero status only means the group is already gone
    if let Err(e) = status {
        warn!(stage, pid, signal, error = %e, "failed to invoke kill");
    }
}

#[cfg(not(unix))]
async fn signal_group(_pid: Option<u32>, _signal: &str, _stage: &str) {}

fn forward_lines<R>(reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<(OutputStream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "output pipe closed");
                    break;
                }
            }

            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
            }

            // Invalid UTF-8 is replaced rather than ending the stream
            let line = String::from_utf8_lossy(&buf).into_owned();
            if tx.send((stream, line)).is_err() {
                break;
            }
        }
    });
}
