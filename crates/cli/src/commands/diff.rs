// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wardrop diff`: show what a deploy would send to one host.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use wd_engine::{TransferClient, TransferOptions};

use crate::client::{self, TcpTransport};
use crate::output::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Archive to compare
    pub archive: PathBuf,

    /// Receiving host as `host[:port]`
    #[arg(short = 'H', long)]
    pub host: String,
}

pub async fn handle(args: DiffArgs, format: OutputFormat) -> Result<()> {
    let local = super::local_hashes(args.archive).await?;

    let transport = TcpTransport::new(&args.host);
    let addr = transport.addr().to_string();
    let version = client::hello(&transport, Duration::from_secs(15)).await?;
    tracing::debug!(host = %addr, %version, "connected");

    let changes = TransferClient::new(transport, TransferOptions::default()).diff(&local).await?;
    println!("{}", output::format_changes(&addr, &changes, format)?);
    Ok(())
}
