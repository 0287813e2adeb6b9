// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Apply a change set to an archive on disk.
//!
//! The archive is extracted into a private temporary directory, edited there
//! and repackaged, in its original container format and with its original
//! permissions, into a sibling temp file that replaces the target with a
//! single rename. Any failure leaves the original archive untouched.

use std::path::{Path, PathBuf};

use wd_core::FileEntry;

use crate::format::{self, Format};
use crate::path::{resolve_existing, resolve_inside, validate_entry_path};
use crate::ArchiveError;

/// Replace `files` and remove `deletions` inside the archive at `archive_path`.
///
/// Every path is validated before anything on disk changes.
pub fn apply_changes(
    archive_path: &Path,
    files: &[FileEntry],
    deletions: &[String],
) -> Result<(), ArchiveError> {
    let validated_files = files
        .iter()
        .map(|f| Ok((validate_entry_path(&f.path)?, f)))
        .collect::<Result<Vec<(PathBuf, &FileEntry)>, ArchiveError>>()?;
    let validated_deletions = deletions
        .iter()
        .map(|d| Ok((validate_entry_path(d)?, d.as_str())))
        .collect::<Result<Vec<(PathBuf, &str)>, ArchiveError>>()?;

    // Removed on drop, on every exit path
    let workdir = tempfile::Builder::new().prefix("wardrop-extract-").tempdir()?;
    let root = workdir.path().canonicalize()?;

    let format = format::extract(archive_path, &root)?;

    for (rel, original) in &validated_deletions {
        // A missing parent directory means there is nothing to delete
        let Some(target) = resolve_existing(&root, rel, original)? else {
            tracing::debug!(path = %original, "deleted entry not present in archive");
            continue;
        };
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %original, "deleted entry not present in archive");
            }
            Err(e) => return Err(e.into()),
        }
    }

    for (rel, entry) in &validated_files {
        let target = resolve_inside(&root, rel, &entry.path)?;
        // Never write through a symlink planted by the archive itself
        if let Ok(meta) = std::fs::symlink_metadata(&target) {
            if meta.file_type().is_symlink() || meta.is_dir() {
                remove_any(&target, meta.is_dir())?;
            }
        }
        std::fs::write(&target, &entry.content)?;
    }

    repackage(format, &root, archive_path)?;

    tracing::info!(
        archive = %archive_path.display(),
        changed = files.len(),
        deleted = deletions.len(),
        "archive updated"
    );
    Ok(())
}

fn remove_any(path: &Path, is_dir: bool) -> std::io::Result<()> {
    if is_dir {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Pack `root` into a temp file next to `target`, then rename it into place.
fn repackage(format: Format, root: &Path, target: &Path) -> Result<(), ArchiveError> {
    let permissions = std::fs::metadata(target)?.permissions();
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let staged = tempfile::Builder::new().prefix(".wardrop-").suffix(".tmp").tempfile_in(&parent)?;

    format::pack(format, root, staged.as_file())?;

    staged.as_file().sync_all()?;
    std::fs::set_permissions(staged.path(), permissions)?;
    staged.persist(target).map_err(|e| ArchiveError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
#[path = "mutate_tests.rs"]
mod tests;
