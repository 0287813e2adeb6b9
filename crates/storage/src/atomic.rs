// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Small-file persistence helpers.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

/// Serialize `value` as pretty JSON into a temp file in the same directory,
/// fsync it, and return it ready to be linked or renamed into place.
pub(crate) fn stage_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<tempfile::NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut staged = tempfile::Builder::new().prefix(".wardrop-").suffix(".tmp").tempfile_in(dir)?;
    let json = serde_json::to_vec_pretty(value).map_err(std::io::Error::other)?;
    staged.write_all(&json)?;
    staged.as_file().sync_all()?;
    Ok(staged)
}

/// Atomically replace `path` with the JSON encoding of `value`.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    stage_json(path, value)?.persist(path).map_err(|e| e.error)?;
    Ok(())
}
