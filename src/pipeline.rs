//! Provisioning pipeline orchestrator.
//!
//! One run moves through a fixed sequence of stages:
//!
//! 1. lock the cache path and check whether the archive is already cached;
//! 2. on a miss, resolve the latest release asset URL and fetch it;
//! 3. verify the archive digest when one is configured;
//! 4. extract the archive into the destination directory.
//!
//! The first failure ends the run and is returned as a [`PipelineError`]
//! carrying the component error that caused it. Extraction is never
//! attempted unless a complete archive is on disk.

use camino::Utf8Path;
use log::{info, warn};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::artefact::extraction::{ArchiveExtractor, ExtractError, ZipExtractor};
use crate::artefact::fetch::{ArtifactFetcher, FetchError, HttpFetcher};
use crate::artefact::release::{GithubReleaseResolver, ReleaseResolver, ResolutionError};
use crate::artefact::sha256_digest::{Sha256Digest, compute_sha256};
use crate::config::PipelineConfig;
use crate::lock::CacheLock;

/// The step of a run that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Locking the cache path and testing for a cached archive.
    CheckCache,
    /// Looking up the asset in the latest release.
    Resolve,
    /// Downloading the asset.
    Fetch,
    /// Checking the archive digest.
    Verify,
    /// Unpacking the archive.
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CheckCache => "check-cache",
            Self::Resolve => "resolve",
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Extract => "extract",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The cache lock could not be taken.
    #[error("cannot lock cache at {path}: {source}")]
    Lock {
        /// The lock file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The release asset could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolutionError),

    /// The asset could not be downloaded.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The archive could not be read for hashing.
    #[error("cannot hash archive {path}: {source}")]
    DigestRead {
        /// The archive being hashed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The archive does not match the configured digest.
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The archive that was hashed.
        path: PathBuf,
        /// The configured digest.
        expected: Sha256Digest,
        /// The digest of the file on disk.
        actual: Sha256Digest,
    },

    /// The archive could not be extracted.
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl PipelineError {
    /// The stage at which the run failed.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Lock { .. } => Stage::CheckCache,
            Self::Resolve(_) => Stage::Resolve,
            Self::Fetch(_) => Stage::Fetch,
            Self::DigestRead { .. } | Self::ChecksumMismatch { .. } => Stage::Verify,
            Self::Extract(_) => Stage::Extract,
        }
    }
}

/// Where the extracted archive came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    /// The archive was already present at the cache path.
    Cached,
    /// The archive was downloaded during this run.
    Downloaded {
        /// The URL it was fetched from.
        url: String,
    },
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// The archive that was extracted.
    pub archive_path: PathBuf,
    /// The directory it was extracted into.
    pub destination_dir: PathBuf,
    /// Whether the archive was cached or freshly downloaded.
    pub source: ArchiveSource,
    /// Relative paths of the extracted files.
    pub extracted: Vec<PathBuf>,
}

/// The orchestrator: a configuration plus the three collaborators.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    resolver: &'a dyn ReleaseResolver,
    fetcher: &'a dyn ArtifactFetcher,
    extractor: &'a dyn ArchiveExtractor,
}

impl fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> Pipeline<'a> {
    /// Assemble a pipeline from explicit collaborators.
    ///
    /// Tests inject doubles here; [`provision`] wires the production
    /// implementations.
    #[must_use]
    pub fn new(
        config: &'a PipelineConfig,
        resolver: &'a dyn ReleaseResolver,
        fetcher: &'a dyn ArtifactFetcher,
        extractor: &'a dyn ArchiveExtractor,
    ) -> Self {
        Self {
            config,
            resolver,
            fetcher,
            extractor,
        }
    }

    /// Execute one run.
    ///
    /// # Errors
    ///
    /// Returns the [`PipelineError`] of the first stage that fails; see
    /// [`PipelineError::stage`].
    pub fn run(&self) -> Result<ProvisionReport, PipelineError> {
        let cache_path = self.config.cache_path.as_std_path();
        let destination_dir = self.config.destination_dir.as_std_path();

        let _lock = CacheLock::acquire(cache_path).map_err(|source| PipelineError::Lock {
            path: crate::lock::lock_path(cache_path),
            source,
        })?;

        let source = if cache_path.exists() {
            info!("using cached archive {}", cache_path.display());
            ArchiveSource::Cached
        } else {
            info!("{} not cached; fetching latest release", self.config.asset_name);
            let url = self.download(cache_path)?;
            ArchiveSource::Downloaded { url }
        };

        if let Some(expected) = &self.config.expected_sha256 {
            self.verify(cache_path, expected, &source)?;
        }

        info!("extracting into {}", destination_dir.display());
        let extracted = self.extractor.extract(cache_path, destination_dir)?;
        info!("extracted {} files", extracted.len());

        Ok(ProvisionReport {
            archive_path: cache_path.to_path_buf(),
            destination_dir: destination_dir.to_path_buf(),
            source,
            extracted,
        })
    }

    /// Resolve the asset URL and fetch it to `cache_path`.
    fn download(&self, cache_path: &Path) -> Result<String, PipelineError> {
        let url = self.resolver.resolve_asset_url(&self.config.asset_name)?;
        info!("downloading {url}");
        self.fetcher.fetch(&url, cache_path)?;
        Ok(url)
    }

    /// Compare the archive digest with `expected`.
    ///
    /// A mismatching archive fetched during this run is removed so that the
    /// next run downloads it again; a mismatching cached archive is left
    /// alone.
    fn verify(
        &self,
        cache_path: &Path,
        expected: &Sha256Digest,
        source: &ArchiveSource,
    ) -> Result<(), PipelineError> {
        let actual = compute_sha256(cache_path).map_err(|err| PipelineError::DigestRead {
            path: cache_path.to_path_buf(),
            source: err,
        })?;
        if &actual == expected {
            return Ok(());
        }
        if matches!(source, ArchiveSource::Downloaded { .. }) {
            if let Err(err) = std::fs::remove_file(cache_path) {
                warn!(
                    "failed to remove mismatching download {}: {err}",
                    cache_path.display()
                );
            }
        }
        Err(PipelineError::ChecksumMismatch {
            path: cache_path.to_path_buf(),
            expected: expected.clone(),
            actual,
        })
    }
}

/// Run the pipeline with the GitHub resolver, HTTP fetcher, and zip
/// extractor.
///
/// # Errors
///
/// Returns the [`PipelineError`] of the first stage that fails.
pub fn provision(config: &PipelineConfig) -> Result<ProvisionReport, PipelineError> {
    let resolver = GithubReleaseResolver::new(&config.release);
    let fetcher = HttpFetcher::new();
    Pipeline::new(config, &resolver, &fetcher, &ZipExtractor).run()
}

/// Convenience wrapper that builds a default configuration for the given
/// paths and runs [`provision`].
///
/// # Errors
///
/// Returns the [`PipelineError`] of the first stage that fails.
pub fn provision_default(
    cache_path: &Utf8Path,
    destination_dir: &Utf8Path,
) -> Result<ProvisionReport, PipelineError> {
    provision(&PipelineConfig::new(cache_path, destination_dir))
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
