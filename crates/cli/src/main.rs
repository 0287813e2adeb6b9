// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wardrop: push incremental archive updates to receiving hosts.

mod client;
mod color;
mod commands;
mod exit_error;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{deploy::DeployArgs, diff::DiffArgs};
use exit_error::ExitError;
use output::OutputFormat;

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Parser, Debug)]
#[command(name = "wardrop", version, about = "Incremental web-archive deployer", styles = color::styles())]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deploy an archive to one or more hosts
    Deploy(DeployArgs),
    /// Show a host's last deployment and lock
    Status {
        /// Receiving host as `host[:port]`
        #[arg(short = 'H', long)]
        host: String,
    },
    /// Show what a deploy would change on a host
    Diff(DiffArgs),
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Deploy(args) => commands::deploy::handle(args, cli.output).await,
        Commands::Status { host } => commands::status::handle(host, cli.output).await,
        Commands::Diff(args) => commands::diff::handle(args, cli.output).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // Only fails when a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = match e.downcast_ref::<ExitError>() {
                Some(exit) => exit.code,
                None => exit_error::codes::FAILURE,
            };
            eprintln!("wardrop: {e:#}");
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
