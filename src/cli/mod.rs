// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for pipewright.

pub mod graph;
pub mod run;
pub mod validate;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::pipeline::PipelineSpec;

/// Default pipeline file looked up in the working directory
pub const DEFAULT_PIPELINE_FILE: &str = "pipewright.yaml";

/// DAG build and deploy pipeline runner
#[derive(Parser, Debug)]
#[clap(
    name = "pipewright",
    version,
    about = "Run build and deploy pipelines as a dependency graph of stages",
    long_about = None,
    after_help = "Examples:\n\
        pipewright run                      Run ./pipewright.yaml\n\
        pipewright run -p ci.toml -j 8      Run a TOML pipeline, 8 stages at a time\n\
        pipewright validate ci.yaml         Check a pipeline without running it\n\
        pipewright graph -f mermaid         Print the stage graph\n\n\
        Set PIPEWRIGHT_LOG (e.g. pipewright=debug) to control log output.\n\
        See 'pipewright <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline
    Run {
        /// Pipeline file
        #[clap(short, long, default_value = DEFAULT_PIPELINE_FILE)]
        pipeline: PathBuf,

        /// Maximum number of stages running at once (overrides the pipeline)
        #[clap(short = 'j', long, value_name = "N")]
        concurrency: Option<usize>,

        /// Directory run workspaces are created in (default: system temp dir)
        #[clap(long, value_name = "DIR", env = "PIPEWRIGHT_WORKSPACE_ROOT")]
        workspace_root: Option<PathBuf>,

        /// Copy the pipeline's artifacts into DIR/<run id>
        #[clap(long, value_name = "DIR")]
        artifacts_dir: Option<PathBuf>,

        /// Report format
        #[clap(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Validate pipeline configuration
    Validate {
        /// Pipeline file to validate
        #[clap(default_value = DEFAULT_PIPELINE_FILE)]
        pipeline: PathBuf,
    },

    /// Show pipeline as a graph
    Graph {
        /// Pipeline file
        #[clap(default_value = DEFAULT_PIPELINE_FILE)]
        pipeline: PathBuf,

        /// Output format
        #[clap(short, long, default_value = "text")]
        format: GraphFormat,
    },
}

/// Output format for the run report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

impl std::str::FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            _ => Err(format!("Unknown graph format: {}", s)),
        }
    }
}

/// Load a pipeline file for a command
pub(crate) fn load_pipeline(path: &Path) -> miette::Result<PipelineSpec> {
    if !path.exists() {
        return Err(miette::miette!(
            "Pipeline file not found: {}\n\n\
             Create {} or pass a file with -p.",
            path.display(),
            DEFAULT_PIPELINE_FILE
        ));
    }

    Ok(PipelineSpec::from_file(path)?)
}
