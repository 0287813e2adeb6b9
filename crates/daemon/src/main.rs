// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wardropd entry point.

use std::process::ExitCode;

use wd_daemon::{lifecycle, logging, Config};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("wardropd: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match logging::init(&config.log_path) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("wardropd: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(state_dir = %config.state_dir.display(), port = config.port, "starting wardropd");

    match lifecycle::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "daemon failed");
            eprintln!("wardropd: {e}");
            ExitCode::FAILURE
        }
    }
}
