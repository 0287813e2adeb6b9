// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use thiserror::Error;

/// Errors from reading or rewriting an archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot open archive {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt archive {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsafe entry path '{path}': {reason}")]
    UnsafePath { path: String, reason: &'static str },
    #[error("entry not found in archive: {0}")]
    MissingEntry(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}
