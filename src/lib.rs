// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! # pipewright - DAG build and deploy pipelines
//!
//! `pipewright` runs a pipeline of stages (checkout, build, test, deploy...)
//! as a dependency graph: independent stages run concurrently, failures
//! skip everything downstream, and every run gets a throwaway workspace.
//!
//! ## Features
//!
//! - **Dependency graph** - stages start as soon as their dependencies succeed
//! - **Bounded concurrency** - never more than N stages at once
//! - **Retries and timeouts** - per stage, with exponential backoff
//! - **Cancellation** - stops running commands and cleans up the workspace
//! - **Structured reports** - per-stage status, attempts, output and artifacts
//!
//! ## Quick Start
//!
//! ```bash
//! # Check a pipeline
//! pipewright validate pipewright.yaml
//!
//! # Run it
//! pipewright run
//!
//! # Show the stage graph
//! pipewright graph --format mermaid
//! ```
//!
//! As a library:
//!
//! ```no_run
//! use std::sync::Arc;
//! use pipewright::{PipelineRunner, PipelineSpec, ProcessExecutor, StageSpec};
//!
//! # async fn demo() -> pipewright::PipewrightResult<()> {
//! let pipeline = PipelineSpec::new(
//!     "demo",
//!     vec![
//!         StageSpec::command("build", "make", ["all"]),
//!         StageSpec::command("test", "make", ["test"]).after(["build"]),
//!     ],
//! );
//!
//! let report = PipelineRunner::new(Arc::new(ProcessExecutor::new()))
//!     .execute(&pipeline)
//!     .await?;
//! println!("{}", report.status);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod cli;
pub mod errors;
pub mod executors;
pub mod pipeline;
pub mod workspace;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use errors::{ErrorKind, PipewrightError, PipewrightResult};
pub use executors::{CommandExecutor, Invocation, OutputSink, ProcessExecutor};
pub use pipeline::{
    PipelineRunner, PipelineSpec, RunReport, RunStatus, StageGraph, StageSpec, StageStatus,
};
pub use workspace::WorkspaceManager;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
