// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Run command - execute the pipeline

use colored::{ColoredString, Colorize};
use miette::Result;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use super::{load_pipeline, OutputFormat};
use crate::cancel::CancelToken;
use crate::executors::{OutputSink, OutputStream, ProcessExecutor};
use crate::pipeline::{PipelineRunner, RunReport, RunStatus, StageStatus};
use crate::workspace::WorkspaceManager;

/// Options of the run command
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub pipeline: PathBuf,
    pub concurrency: Option<usize>,
    pub workspace_root: Option<PathBuf>,
    pub artifacts_dir: Option<PathBuf>,
    pub format: OutputFormat,
}

/// Prints stage output as `[stage] line`
///
/// Writes to stderr when stdout is reserved for a machine-readable report.
pub struct ConsoleSink {
    to_stderr: bool,
}

impl ConsoleSink {
    pub fn new(to_stderr: bool) -> Self {
        Self { to_stderr }
    }

    fn format_line(stage: &str, stream: OutputStream, line: &str) -> String {
        let prefix = format!("[{}]", stage);
        let prefix = match stream {
            OutputStream::Stdout => prefix.cyan(),
            OutputStream::Stderr => prefix.yellow(),
        };
        format!("{} {}", prefix, line)
    }
}

impl OutputSink for ConsoleSink {
    fn line(&self, stage: &str, stream: OutputStream, line: &str) {
        let text = Self::format_line(stage, stream, line);

        // A closed pipe must not take the run down with it
        if self.to_stderr {
            let _ = writeln!(std::io::stderr().lock(), "{}", text);
        } else {
            let _ = writeln!(std::io::stdout().lock(), "{}", text);
        }
    }
}

/// Run the pipeline
pub async fn run(args: RunArgs, verbose: bool) -> Result<()> {
    let pipeline = load_pipeline(&args.pipeline)?;
    let json = args.format == OutputFormat::Json;

    let mut runner = PipelineRunner::new(Arc::new(ProcessExecutor::new()))
        .with_sink(Arc::new(ConsoleSink::new(json)));

    if let Some(root) = args.workspace_root {
        runner = runner.with_workspaces(WorkspaceManager::with_root(root));
    }
    if let Some(dir) = args.artifacts_dir {
        runner = runner.with_artifacts_dir(dir);
    }
    if let Some(n) = args.concurrency {
        runner = runner.with_concurrency(n);
    }

    if !json {
        println!(
            "{} {} ({} stages)",
            "Running pipeline".bold(),
            pipeline.name.cyan(),
            pipeline.stages.len()
        );
        println!();
    }

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, cancelling run...".yellow());
            on_interrupt.cancel();
        }
    });

    let report = runner.execute_with_cancel(&pipeline, cancel).await?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        print_summary(&report, verbose);
    }

    match report.status {
        RunStatus::Succeeded => Ok(()),
        RunStatus::Failed => Err(miette::miette!("Pipeline '{}' failed", report.pipeline)),
        RunStatus::Cancelled => Err(miette::miette!("Pipeline '{}' was cancelled", report.pipeline)),
    }
}

fn status_marker(status: StageStatus) -> ColoredString {
    match status {
        StageStatus::Succeeded => "✓".green(),
        StageStatus::Failed => "✗".red(),
        StageStatus::Skipped => "-".dimmed(),
        StageStatus::Cancelled => "⊘".yellow(),
        StageStatus::Pending | StageStatus::Running => "?".normal(),
    }
}

fn print_summary(report: &RunReport, verbose: bool) {
    println!();
    println!("{}:", "Stages".bold());

    for stage in &report.stages {
        let timing = stage
            .duration()
            .map(|d| format!(" in {:.2}s", d.as_secs_f64()))
            .unwrap_or_default();
        let attempts = if stage.attempts > 1 {
            format!(", {} attempts", stage.attempts)
        } else {
            String::new()
        };
        let optional = if stage.required { "" } else { " (allowed to fail)" };

        println!(
            "  {} {} {}{}{}{}",
            status_marker(stage.status),
            stage.name,
            stage.status.to_string().dimmed(),
            timing.dimmed(),
            attempts.dimmed(),
            optional.dimmed()
        );

        if let Some(error) = &stage.error {
            if stage.status == StageStatus::Failed || verbose {
                println!("      {}", error.dimmed());
            }
        }
    }

    if !report.artifacts.is_empty() {
        println!();
        println!("{}:", "Artifacts".bold());
        for artifact in &report.artifacts {
            println!(
                "  - {} ({} bytes, blake3 {})",
                artifact.path.display(),
                artifact.size,
                &artifact.blake3[..16.min(artifact.blake3.len())]
            );
        }
    }

    println!();
    let headline = format!(
        "Run {} {} in {:.2}s",
        report.run_id,
        report.status,
        report.duration.as_secs_f64()
    );
    match report.status {
        RunStatus::Succeeded => println!("{}", headline.green().bold()),
        RunStatus::Failed => println!("{}", headline.red().bold()),
        RunStatus::Cancelled => println!("{}", headline.yellow().bold()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_line_format() {
        colored::control::set_override(false);
        let line = ConsoleSink::format_line("build", OutputStream::Stdout, "compiling");
        assert_eq!(line, "[build] compiling");
    }
}
