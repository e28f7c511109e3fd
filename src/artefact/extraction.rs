//! Zip archive extraction with path traversal protection.
//!
//! Every entry name is checked before a single byte is written, so an
//! archive carrying a zip-slip entry such as `../../etc/passwd` is refused
//! as a whole rather than half-extracted.

use log::{debug, info};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;
use zip::result::ZipError;

/// Trait for extracting archives, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor {
    /// Extract the archive at `archive_path` into `destination_dir`.
    ///
    /// Returns the relative paths of the files that were written, in
    /// archive order.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::MissingSource`] if the archive does not
    /// exist, [`ExtractError::Corrupt`] if it cannot be parsed or read,
    /// [`ExtractError::UnsafeEntry`] if any entry would land outside
    /// `destination_dir`, and [`ExtractError::Io`] on local write failures.
    fn extract(
        &self,
        archive_path: &Path,
        destination_dir: &Path,
    ) -> Result<Vec<PathBuf>, ExtractError>;
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The archive file does not exist.
    #[error("archive not found: {path}")]
    MissingSource {
        /// Where the archive was expected.
        path: PathBuf,
    },

    /// The archive structure or an entry's data is damaged.
    #[error("archive {path} is corrupt: {reason}")]
    Corrupt {
        /// The archive that failed to parse.
        path: PathBuf,
        /// A human-readable description of the damage.
        reason: String,
    },

    /// An entry would be written outside the destination directory.
    #[error("unsafe archive entry rejected: {entry}")]
    UnsafeEntry {
        /// The entry name as stored in the archive.
        entry: String,
    },

    /// A local filesystem operation failed.
    #[error("extraction I/O error at {path}: {source}")]
    Io {
        /// The file or directory being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Extractor for `.zip` archives backed by the `zip` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

/// One validated entry, ready to be written.
#[derive(Debug)]
struct PlannedEntry {
    index: usize,
    relative: PathBuf,
    is_dir: bool,
}

impl ArchiveExtractor for ZipExtractor {
    fn extract(
        &self,
        archive_path: &Path,
        destination_dir: &Path,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        if !archive_path.exists() {
            return Err(ExtractError::MissingSource {
                path: archive_path.to_path_buf(),
            });
        }
        fs::create_dir_all(destination_dir).map_err(io_error(destination_dir))?;

        let file = File::open(archive_path).map_err(io_error(archive_path))?;
        let mut archive =
            ZipArchive::new(file).map_err(|err| corrupt(archive_path, &err))?;
        let plan = plan_entries(&mut archive, archive_path)?;
        info!(
            "extracting {} entries from {} into {}",
            plan.len(),
            archive_path.display(),
            destination_dir.display()
        );

        let mut extracted = Vec::new();
        for entry in plan {
            let target = destination_dir.join(&entry.relative);
            if entry.is_dir {
                fs::create_dir_all(&target).map_err(io_error(&target))?;
                continue;
            }
            write_entry(&mut archive, &entry, archive_path, &target)?;
            debug!("extracted {}", entry.relative.display());
            extracted.push(entry.relative);
        }
        Ok(extracted)
    }
}

/// Validate every entry name and record where it will be written.
///
/// Directory entries that normalise to the destination itself (such as
/// `./`) carry nothing to create and are dropped from the plan.
fn plan_entries(
    archive: &mut ZipArchive<File>,
    archive_path: &Path,
) -> Result<Vec<PlannedEntry>, ExtractError> {
    let mut plan = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|err| corrupt(archive_path, &err))?;
        let relative = validate_entry_name(entry.name())?;
        let is_dir = entry.is_dir();
        if relative.as_os_str().is_empty() {
            if is_dir {
                continue;
            }
            return Err(unsafe_entry(entry.name()));
        }
        if entry.enclosed_name().is_none() {
            return Err(unsafe_entry(entry.name()));
        }
        plan.push(PlannedEntry {
            index,
            relative,
            is_dir,
        });
    }
    Ok(plan)
}

/// Decompress one file entry onto `target`, replacing any existing file.
fn write_entry(
    archive: &mut ZipArchive<File>,
    entry: &PlannedEntry,
    archive_path: &Path,
    target: &Path,
) -> Result<(), ExtractError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let mut reader = archive
        .by_index(entry.index)
        .map_err(|err| corrupt(archive_path, &err))?;
    let mut output = File::create(target).map_err(io_error(target))?;
    io::copy(&mut reader, &mut output).map_err(|err| {
        // The zip reader signals CRC and inflate failures as invalid data.
        if err.kind() == io::ErrorKind::InvalidData {
            ExtractError::Corrupt {
                path: archive_path.to_path_buf(),
                reason: format!("entry {}: {err}", entry.relative.display()),
            }
        } else {
            ExtractError::Io {
                path: target.to_path_buf(),
                source: err,
            }
        }
    })?;
    Ok(())
}

/// Turn an archive entry name into a relative path that stays inside the
/// destination.
///
/// Absolute paths, drive prefixes, and `..` components are rejected;
/// `.` components are dropped, which may leave an empty path.
fn validate_entry_name(name: &str) -> Result<PathBuf, ExtractError> {
    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_entry(name));
            }
        }
    }
    Ok(relative)
}

fn unsafe_entry(name: &str) -> ExtractError {
    ExtractError::UnsafeEntry {
        entry: name.to_owned(),
    }
}

fn corrupt(path: &Path, err: &ZipError) -> ExtractError {
    ExtractError::Corrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ExtractError + '_ {
    move |source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
#[path = "extraction_tests.rs"]
mod tests;
