// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! pipewright - DAG build and deploy pipeline runner

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pipewright::cli::run::RunArgs;
use pipewright::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries stage output and reports
    let default_filter = if cli.verbose {
        "pipewright=debug"
    } else {
        "pipewright=info"
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("PIPEWRIGHT_LOG")
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            pipeline,
            concurrency,
            workspace_root,
            artifacts_dir,
            format,
        } => {
            let args = RunArgs {
                pipeline,
                concurrency,
                workspace_root,
                artifacts_dir,
                format,
            };
            pipewright::cli::run::run(args, cli.verbose).await
        }
        Commands::Validate { pipeline } => {
            pipewright::cli::validate::run(pipeline, cli.verbose).await
        }
        Commands::Graph { pipeline, format } => {
            pipewright::cli::graph::run(pipeline, format, cli.verbose).await
        }
    }
}
