// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod deploy;
pub mod diff;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use wd_core::ArchiveHashMap;

/// Content hashes of the local archive, computed off the runtime.
pub(crate) async fn local_hashes(archive: PathBuf) -> Result<ArchiveHashMap> {
    let archive_display = archive.display().to_string();
    let hashes = tokio::task::spawn_blocking(move || wd_archive::compute_hashes(&archive))
        .await?
        .with_context(|| format!("failed to read archive {}", archive_display))?;
    tracing::debug!(archive = %archive_display, entries = hashes.len(), "hashed local archive");
    Ok(hashes)
}
