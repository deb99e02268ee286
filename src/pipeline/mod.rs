// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Pipeline definitions and execution
//!
//! This module defines what a pipeline is (stages, dependencies, retry and
//! timeout settings) and how one is run: the dependency graph, the
//! scheduler, the per-stage retry loop and the report a run produces.

mod dag;
mod definition;
mod legacy;
mod report;
mod run;
mod scheduler;
mod stage;
mod validation;

pub use dag::StageGraph;
pub use definition::*;
pub use legacy::LegacyConfig;
pub use report::{
    AttemptOutcome, AttemptRecord, RunId, RunReport, RunStatus, StageResult, StageStatus,
};
pub use run::PipelineRunner;
pub use scheduler::{ScheduleOutcome, Scheduler};
pub use stage::{build_invocation, execute_stage, RunContext, StageOutcome};
pub use validation::{PipelineValidator, ValidationResult};
