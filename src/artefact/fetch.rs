//! Streamed archive download with atomic placement.
//!
//! The response body is copied in 1 MiB chunks into a temporary file that
//! lives next to the destination. Only once the whole body has been
//! written and flushed is the temporary file renamed onto the destination,
//! so an interrupted transfer never leaves a partial file where the cache
//! check would mistake it for a complete archive.

use crate::artefact::http::{describe_ureq_error, download_agent};
use crate::artefact::progress::{LogProgress, ProgressReporter, TransferProgress};
use log::{debug, info};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Size of each read from the response body.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Mode requested for the stored archive; the process umask still applies.
#[cfg(unix)]
const ARCHIVE_MODE: u32 = 0o644;

/// Trait for downloading a URL to a local file.
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactFetcher {
    /// Download `url` into `destination`.
    ///
    /// On success `destination` holds the complete body. On failure it is
    /// left as it was before the call.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] for transport failures, non-2xx
    /// responses, and truncated bodies, and [`FetchError::Io`] when the
    /// destination cannot be created or written.
    fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError>;
}

/// Errors arising from archive downloads.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request failed, the server refused it, or the body was cut short.
    #[error("download failed for {url}: {reason}")]
    Network {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The downloaded bytes could not be stored locally.
    #[error("cannot write download to {path}: {source}")]
    Io {
        /// The file or directory that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// HTTP fetcher using `ureq`.
///
/// Progress goes to [`LogProgress`] unless another reporter is supplied.
pub struct HttpFetcher {
    reporter: Box<dyn ProgressReporter>,
}

impl HttpFetcher {
    /// Fetcher that logs progress at debug level.
    #[must_use]
    pub fn new() -> Self {
        Self::with_reporter(LogProgress)
    }

    /// Fetcher that sends progress snapshots to `reporter`.
    #[must_use]
    pub fn with_reporter(reporter: impl ProgressReporter + 'static) -> Self {
        Self {
            reporter: Box::new(reporter),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher").finish_non_exhaustive()
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
        let response = download_agent()
            .get(url)
            .call()
            .map_err(|e| network_error(url, describe_ureq_error(&e)))?;
        let total = content_length(response.headers());
        match total {
            Some(bytes) => info!("downloading {bytes} bytes from {url}"),
            None => info!("downloading {url} (size unknown)"),
        }

        let mut body = response.into_body().into_reader();
        store_atomically(&mut body, destination, total, self.reporter.as_ref())
            .map(|_| ())
            .map_err(|err| err.into_fetch_error(url))
    }
}

/// Parse the `Content-Length` header, treating absence or garbage as
/// unknown.
fn content_length(headers: &ureq::http::HeaderMap) -> Option<u64> {
    headers
        .get("content-length")?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Failure while moving bytes from the body to disk.
#[derive(Debug)]
pub(crate) enum StreamError {
    /// Reading the body failed.
    Read(io::Error),
    /// The body ended before the announced length.
    Truncated { expected: u64, received: u64 },
    /// A local filesystem operation failed on `path`.
    Write { path: PathBuf, source: io::Error },
}

impl StreamError {
    fn into_fetch_error(self, url: &str) -> FetchError {
        match self {
            Self::Read(err) => network_error(url, format!("error reading response body: {err}")),
            Self::Truncated { expected, received } => network_error(
                url,
                format!("response ended after {received} of {expected} bytes"),
            ),
            Self::Write { path, source } => FetchError::Io { path, source },
        }
    }
}

/// Stream `reader` into a temporary sibling of `destination` and rename it
/// into place once complete.
pub(crate) fn store_atomically(
    reader: &mut dyn Read,
    destination: &Path,
    total: Option<u64>,
    reporter: &dyn ProgressReporter,
) -> Result<u64, StreamError> {
    let parent = staging_dir(destination);
    std::fs::create_dir_all(parent).map_err(|source| StreamError::Write {
        path: parent.to_path_buf(),
        source,
    })?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(".download-").suffix(".part");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(ARCHIVE_MODE));
    }
    let staged = builder
        .tempfile_in(parent)
        .map_err(|source| StreamError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    let staged_path = staged.path().to_path_buf();
    let write_error = |source: io::Error| StreamError::Write {
        path: staged_path.clone(),
        source,
    };

    let mut file = staged.as_file();
    let written = copy_in_chunks(reader, &mut file, &staged_path, total, reporter)?;
    if let Some(expected) = total {
        if written < expected {
            return Err(StreamError::Truncated {
                expected,
                received: written,
            });
        }
    }
    file.flush().map_err(write_error)?;
    file.sync_all().map_err(write_error)?;

    staged
        .persist(destination)
        .map_err(|err| StreamError::Write {
            path: destination.to_path_buf(),
            source: err.error,
        })?;
    debug!("stored {written} bytes at {}", destination.display());
    Ok(written)
}

/// Copy `reader` to `writer` through a [`CHUNK_SIZE`] buffer, reporting
/// progress after every non-empty chunk.
///
/// `writer_path` names the file behind `writer` in write errors. Returns
/// the number of bytes copied.
pub(crate) fn copy_in_chunks(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    writer_path: &Path,
    total: Option<u64>,
    reporter: &dyn ProgressReporter,
) -> Result<u64, StreamError> {
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    let mut transferred: u64 = 0;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(StreamError::Read(err)),
        };
        let chunk = buffer.get(..read).unwrap_or_default();
        writer
            .write_all(chunk)
            .map_err(|source| StreamError::Write {
                path: writer_path.to_path_buf(),
                source,
            })?;
        transferred = transferred.saturating_add(u64::try_from(read).unwrap_or(u64::MAX));
        reporter.report(TransferProgress { transferred, total });
    }
    Ok(transferred)
}

/// Directory that will hold the temporary file for `destination`.
fn staging_dir(destination: &Path) -> &Path {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn network_error(url: &str, reason: String) -> FetchError {
    FetchError::Network {
        url: url.to_owned(),
        reason,
    }
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
