// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Archive containers: zip (WAR, JAR, EAR) and POSIX tar.
//!
//! The format is sniffed from the first bytes of the file and a mutated
//! archive is repackaged in the format it was read from.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::path::{resolve_inside, validate_entry_path};
use crate::ArchiveError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Format {
    Zip,
    Tar,
}

/// Local file header, empty central directory, spanned archive.
const ZIP_MAGIC: [[u8; 4]; 3] = [*b"PK\x03\x04", *b"PK\x05\x06", *b"PK\x07\x08"];

/// Entry name as stored in hash maps: forward slashes, no leading `./`.
pub(crate) fn entry_name(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    raw.trim_start_matches("./").to_string()
}

fn open(path: &Path) -> Result<(Format, BufReader<File>), ArchiveError> {
    let mut file =
        File::open(path).map_err(|source| ArchiveError::Open { path: path.to_path_buf(), source })?;
    let mut magic = [0u8; 4];
    let mut read = 0;
    while read < magic.len() {
        match file.read(&mut magic[read..])? {
            0 => break,
            n => read += n,
        }
    }
    let format = if read == magic.len() && ZIP_MAGIC.contains(&magic) { Format::Zip } else { Format::Tar };
    // Reopen rather than seek so the reader starts clean
    let file =
        File::open(path).map_err(|source| ArchiveError::Open { path: path.to_path_buf(), source })?;
    Ok((format, BufReader::new(file)))
}

fn corrupt(path: &Path) -> impl Fn(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Corrupt { path: path.to_path_buf(), source }
}

fn zip_error(e: zip::result::ZipError) -> io::Error {
    io::Error::other(e)
}

/// Visit every regular-file entry of the archive with its normalized name.
pub(crate) fn for_each_file<F>(archive_path: &Path, mut visit: F) -> Result<(), ArchiveError>
where
    F: FnMut(String, &mut dyn Read) -> io::Result<()>,
{
    let corrupt = corrupt(archive_path);
    match open(archive_path)? {
        (Format::Zip, reader) => {
            let mut archive = ZipArchive::new(reader).map_err(|e| corrupt(zip_error(e)))?;
            for index in 0..archive.len() {
                let mut file = archive.by_index(index).map_err(|e| corrupt(zip_error(e)))?;
                if file.is_dir() {
                    continue;
                }
                let name = entry_name(Path::new(file.name()));
                visit(name, &mut file).map_err(&corrupt)?;
            }
        }
        (Format::Tar, reader) => {
            let mut archive = tar::Archive::new(reader);
            for entry in archive.entries().map_err(&corrupt)? {
                let mut entry = entry.map_err(&corrupt)?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let name = entry_name(&entry.path().map_err(&corrupt)?);
                visit(name, &mut entry).map_err(&corrupt)?;
            }
        }
    }
    Ok(())
}

/// Unpack the archive under `root`, returning the format it was stored in.
///
/// Zip entry names go through the same validation as change-set paths, so an
/// archive carrying `../` entries is refused rather than extracted.
pub(crate) fn extract(archive_path: &Path, root: &Path) -> Result<Format, ArchiveError> {
    let corrupt = corrupt(archive_path);
    match open(archive_path)? {
        (Format::Zip, reader) => {
            let mut archive = ZipArchive::new(reader).map_err(|e| corrupt(zip_error(e)))?;
            for index in 0..archive.len() {
                let mut file = archive.by_index(index).map_err(|e| corrupt(zip_error(e)))?;
                let name = file.name().to_string();
                let rel = validate_entry_path(&name)?;
                let target = resolve_inside(root, &rel, &name)?;
                if file.is_dir() {
                    std::fs::create_dir_all(&target)?;
                } else {
                    let mut out = File::create(&target)?;
                    io::copy(&mut file, &mut out).map_err(&corrupt)?;
                }
            }
            Ok(Format::Zip)
        }
        (Format::Tar, reader) => {
            let mut archive = tar::Archive::new(reader);
            archive.set_preserve_permissions(false);
            // `unpack` itself refuses entries that climb out of `root`
            archive.unpack(root).map_err(&corrupt)?;
            Ok(Format::Tar)
        }
    }
}

/// Write the tree under `root` to `out` in `format`, entries in sorted order.
pub(crate) fn pack(format: Format, root: &Path, out: &File) -> Result<(), ArchiveError> {
    let walker = walkdir::WalkDir::new(root).min_depth(1).sort_by_file_name();
    match format {
        Format::Zip => {
            let mut zip = ZipWriter::new(BufWriter::new(out));
            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o644);
            for entry in walker {
                let entry = entry?;
                let rel = entry.path().strip_prefix(root).map_err(io::Error::other)?;
                let name = entry_name(rel);
                if entry.file_type().is_dir() {
                    zip.add_directory(name, options.unix_permissions(0o755)).map_err(zip_error)?;
                } else if entry.file_type().is_file() {
                    zip.start_file(name, options).map_err(zip_error)?;
                    io::copy(&mut File::open(entry.path())?, &mut zip)?;
                } else {
                    tracing::debug!(path = %name, "skipping non-regular entry");
                }
            }
            let mut writer = zip.finish().map_err(zip_error)?;
            writer.flush()?;
        }
        Format::Tar => {
            let mut builder = tar::Builder::new(BufWriter::new(out));
            builder.follow_symlinks(false);
            for entry in walker {
                let entry = entry?;
                let rel = entry.path().strip_prefix(root).map_err(io::Error::other)?;
                if entry.file_type().is_dir() {
                    builder.append_dir(rel, entry.path())?;
                } else {
                    builder.append_path_with_name(entry.path(), rel)?;
                }
            }
            builder.into_inner()?.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
