// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wardrop deploy`: push an archive to every host under a rollout strategy.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::Instrument;
use wd_core::{ArchiveHashMap, RolloutStrategy, RolloutSummary};
use wd_engine::{run_rollout, TransferClient, TransferOptions, Transport};

use crate::client::TcpTransport;
use crate::exit_error::ExitError;
use crate::output::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Archive to deploy
    pub archive: PathBuf,

    /// Receiving host as `host[:port]`; repeat for several hosts
    #[arg(short = 'H', long = "host", required = true)]
    pub hosts: Vec<String>,

    /// `sequential`, `parallel`, or canary batches such as `1+2+R`
    #[arg(long, default_value = "sequential")]
    pub strategy: RolloutStrategy,

    /// Most files per chunk request
    #[arg(long, default_value_t = 200)]
    pub chunk_files: usize,

    /// Most content bytes per chunk request
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    pub chunk_bytes: usize,

    /// How long to poll for a result after a timeout or conflict
    #[arg(long, default_value_t = 900)]
    pub status_wait_secs: u64,

    /// Timeout for a request that runs a restart
    #[arg(long, default_value_t = 600)]
    pub deploy_timeout_secs: u64,
}

impl DeployArgs {
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions::default()
            .chunk_max_files(self.chunk_files)
            .chunk_max_bytes(self.chunk_bytes)
            .status_wait(Duration::from_secs(self.status_wait_secs))
            .deploy_timeout(Duration::from_secs(self.deploy_timeout_secs))
    }
}

pub async fn handle(args: DeployArgs, format: OutputFormat) -> Result<()> {
    let local = super::local_hashes(args.archive.clone()).await?;
    let options = args.transfer_options();

    let summary = deploy_to_hosts(
        &args.hosts,
        &args.strategy,
        &args.archive,
        &local,
        &options,
        TcpTransport::new,
    )
    .await;

    println!("{}", output::format_summary(&summary, format)?);
    match ExitError::from_summary(&summary) {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Sync `archive` to every host, connecting to each with `connect`.
pub async fn deploy_to_hosts<T, F>(
    hosts: &[String],
    strategy: &RolloutStrategy,
    archive: &Path,
    local: &ArchiveHashMap,
    options: &TransferOptions,
    connect: F,
) -> RolloutSummary
where
    T: Transport,
    F: Fn(&str) -> T,
{
    run_rollout(hosts, strategy, |host| {
        let client = TransferClient::new(connect(host.as_str()), options.clone());
        let span = tracing::info_span!("host", host = %host);
        async move { client.sync(archive, local).await }.instrument(span)
    })
    .await
}

#[cfg(test)]
#[path = "deploy_tests.rs"]
mod tests;
