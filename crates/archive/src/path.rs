// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entry path validation (zip-slip protection).

use std::path::{Component, Path, PathBuf};

use crate::ArchiveError;

fn unsafe_path(path: &str, reason: &'static str) -> ArchiveError {
    ArchiveError::UnsafePath { path: path.to_string(), reason }
}

/// Normalize an entry path from a change set into a relative path that stays
/// inside the archive root.
///
/// Rejects empty and absolute paths (including drive-letter forms) and any
/// path whose `..` components climb above the root. `a/../b` normalizes to
/// `b` and is accepted.
pub fn validate_entry_path(path: &str) -> Result<PathBuf, ArchiveError> {
    if path.is_empty() {
        return Err(unsafe_path(path, "empty path"));
    }
    if path.contains('\0') {
        return Err(unsafe_path(path, "contains NUL byte"));
    }
    let bytes = path.as_bytes();
    if path.starts_with('/')
        || path.starts_with('\\')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
    {
        return Err(unsafe_path(path, "absolute path"));
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(unsafe_path(path, "escapes archive root"));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_path(path, "absolute path"));
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(unsafe_path(path, "resolves to archive root"));
    }
    Ok(normalized)
}

/// Join a validated relative path onto the canonical `root` and check that the
/// resolved location (following any symlinked parent directories) is still
/// strictly inside it. Creates missing parent directories.
pub(crate) fn resolve_inside(root: &Path, rel: &Path, original: &str) -> Result<PathBuf, ArchiveError> {
    let joined = root.join(rel);
    let parent = joined.parent().ok_or_else(|| unsafe_path(original, "no parent directory"))?;
    std::fs::create_dir_all(parent)?;
    confine(root, &parent.canonicalize()?, &joined, original)
}

/// Like [`resolve_inside`] but creates nothing: `None` when the parent
/// directory does not exist.
pub(crate) fn resolve_existing(
    root: &Path,
    rel: &Path,
    original: &str,
) -> Result<Option<PathBuf>, ArchiveError> {
    let joined = root.join(rel);
    let parent = joined.parent().ok_or_else(|| unsafe_path(original, "no parent directory"))?;
    match parent.canonicalize() {
        Ok(parent) => confine(root, &parent, &joined, original).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn confine(root: &Path, parent: &Path, joined: &Path, original: &str) -> Result<PathBuf, ArchiveError> {
    if !parent.starts_with(root) {
        return Err(unsafe_path(original, "resolves outside archive root"));
    }
    let file_name = joined.file_name().ok_or_else(|| unsafe_path(original, "no file name"))?;
    Ok(parent.join(file_name))
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
