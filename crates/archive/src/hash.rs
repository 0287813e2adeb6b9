// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-entry content hashing and hash-map diffing.

use std::collections::BTreeSet;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use wd_core::{ArchiveHashMap, ChangeSet, FileEntry};

use crate::format::for_each_file;
use crate::ArchiveError;

/// Hash every non-directory entry's raw bytes.
pub fn compute_hashes(archive_path: &Path) -> Result<ArchiveHashMap, ArchiveError> {
    let mut hashes = ArchiveHashMap::new();
    for_each_file(archive_path, |name, reader| {
        let mut hasher = Sha256::new();
        io::copy(reader, &mut hasher)?;
        hashes.insert(name, format!("{:x}", hasher.finalize()));
        Ok(())
    })?;
    tracing::debug!(archive = %archive_path.display(), entries = hashes.len(), "hashed archive");
    Ok(hashes)
}

/// Compare a local hash map against a remote one.
///
/// `changed` lists local entries the remote lacks or holds with a different
/// hash; `deleted` lists remote entries the local archive no longer has.
pub fn diff(local: &ArchiveHashMap, remote: &ArchiveHashMap) -> ChangeSet {
    let changed = local
        .iter()
        .filter(|(path, hash)| remote.get(*path) != Some(*hash))
        .map(|(path, _)| path.clone())
        .collect();
    let deleted = remote.keys().filter(|path| !local.contains_key(*path)).cloned().collect();
    ChangeSet { changed, deleted }
}

/// Load the full content of the listed entries, in the order given.
pub fn read_entries(archive_path: &Path, paths: &[String]) -> Result<Vec<FileEntry>, ArchiveError> {
    let wanted: BTreeSet<&str> = paths.iter().map(String::as_str).collect();
    let mut found = std::collections::HashMap::with_capacity(wanted.len());
    for_each_file(archive_path, |name, reader| {
        if wanted.contains(name.as_str()) {
            let mut content = Vec::new();
            reader.read_to_end(&mut content)?;
            found.insert(name, content);
        }
        Ok(())
    })?;

    paths
        .iter()
        .map(|path| match found.get(path) {
            Some(content) => Ok(FileEntry::new(path.clone(), content.clone())),
            None => Err(ArchiveError::MissingEntry(path.clone())),
        })
        .collect()
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod tests;
