// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build small tar and zip archives for tests.

use std::io::{Read, Write};
use std::path::Path;

/// Write a tar archive at `path` holding `entries` as regular files.
pub(crate) fn write_archive(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(file);
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, content.as_bytes()).unwrap();
    }
    builder.finish().unwrap();
}

/// Write a zip archive (a WAR, as a build tool would produce it) at `path`.
/// Names ending in `/` become directory entries.
pub(crate) fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in entries {
        if name.ends_with('/') {
            zip.add_directory(name.to_string(), options).unwrap();
        } else {
            zip.start_file(name.to_string(), options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
    }
    zip.finish().unwrap();
}

/// Read every regular file of an archive, of either format, into sorted
/// `(name, content)` pairs.
pub(crate) fn read_archive(path: &Path) -> Vec<(String, String)> {
    let mut out = Vec::new();
    crate::format::for_each_file(path, |name, reader| {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        out.push((name, content));
        Ok(())
    })
    .unwrap();
    out.sort();
    out
}

/// Every entry name of a zip archive, directories included.
pub(crate) fn zip_names(path: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    archive.file_names().map(str::to_string).collect()
}
