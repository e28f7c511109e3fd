//! Shared test utilities for unit and integration tests.
//!
//! Available to integration tests through the `test-support` feature.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Build an in-memory zip archive.
///
/// Each entry is a `(name, contents)` pair. Names ending in `/` become
/// directory entries and their contents are ignored. Entries are stored
/// uncompressed so that tests can locate and damage their bytes. Names are
/// written verbatim, including unsafe ones such as `../escape.txt`.
///
/// # Errors
///
/// Returns an I/O error if the zip writer rejects an entry.
pub fn zip_bytes(entries: &[(&str, &str)]) -> io::Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).map_err(io::Error::other)?;
        } else {
            writer.start_file(*name, options).map_err(io::Error::other)?;
            writer.write_all(contents.as_bytes())?;
        }
    }
    let cursor = writer.finish().map_err(io::Error::other)?;
    Ok(cursor.into_inner())
}

/// Write a zip archive built by [`zip_bytes`] to `path`.
///
/// # Errors
///
/// Returns an I/O error if the archive cannot be built or written.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) -> io::Result<()> {
    std::fs::write(path, zip_bytes(entries)?)
}

/// Return the lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Read every regular file under `root` into a map keyed by path relative
/// to `root`.
///
/// # Errors
///
/// Returns an I/O error if any directory or file cannot be read.
pub fn snapshot_tree(root: &Path) -> io::Result<BTreeMap<PathBuf, Vec<u8>>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path
                    .strip_prefix(root)
                    .map_err(io::Error::other)?
                    .to_path_buf();
                files.insert(relative, std::fs::read(&path)?);
            }
        }
    }
    Ok(files)
}
