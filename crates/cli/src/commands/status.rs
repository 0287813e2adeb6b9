// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status command handler

use anyhow::Result;
use wd_engine::{TransferClient, TransferOptions};

use crate::client::TcpTransport;
use crate::output::{self, OutputFormat};

pub async fn handle(host: String, format: OutputFormat) -> Result<()> {
    let transport = TcpTransport::new(&host);
    let addr = transport.addr().to_string();
    let response = TransferClient::new(transport, TransferOptions::default()).status().await?;

    println!("{}", output::format_status(&addr, &response, format)?);
    Ok(())
}
