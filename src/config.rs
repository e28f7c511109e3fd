//! Pipeline configuration.
//!
//! Every path the pipeline touches is carried by an explicit
//! [`PipelineConfig`] value handed to the orchestrator; nothing is looked up
//! from ambient state. The defaults describe the Tipiṭaka translation
//! database published by the Digital Pāḷi Dictionary project, and any field
//! can be overridden from TOML:
//!
//! ```toml
//! asset_name = "tipitaka-translation-data.db.zip"
//! cache_path = "resources/tpr/tipitaka-translation-data.db.zip"
//! destination_dir = "resources/tpr"
//!
//! [release]
//! owner = "digitalpalidictionary"
//! repo = "tipitaka-translation-db"
//! ```

use crate::artefact::sha256_digest::Sha256Digest;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// Default repository owner.
pub const DEFAULT_OWNER: &str = "digitalpalidictionary";

/// Default repository name.
pub const DEFAULT_REPO: &str = "tipitaka-translation-db";

/// Default release asset to fetch.
pub const DEFAULT_ASSET_NAME: &str = "tipitaka-translation-data.db.zip";

/// Default REST API root.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Errors arising from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration {path}: {source}")]
    Read {
        /// The file that was requested.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration text is not valid TOML or has unknown fields.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The repository whose releases are consulted.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseSource {
    /// Account or organisation that owns the repository.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// REST API root, without a trailing slash. Overridable for GitHub
    /// Enterprise or local test servers.
    pub api_base: String,
}

impl ReleaseSource {
    /// The `releases/latest` endpoint for this repository.
    ///
    /// # Examples
    ///
    /// ```
    /// use dataset_provisioner::config::ReleaseSource;
    ///
    /// let source = ReleaseSource::default();
    /// assert_eq!(
    ///     source.latest_release_url(),
    ///     "https://api.github.com/repos/digitalpalidictionary/tipitaka-translation-db/releases/latest"
    /// );
    /// ```
    #[must_use]
    pub fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }
}

impl Default for ReleaseSource {
    fn default() -> Self {
        Self {
            owner: DEFAULT_OWNER.to_owned(),
            repo: DEFAULT_REPO.to_owned(),
            api_base: DEFAULT_API_BASE.to_owned(),
        }
    }
}

/// Everything the pipeline needs to know for one run.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Where to look up the latest release.
    #[serde(default)]
    pub release: ReleaseSource,
    /// Exact, case-sensitive name of the asset to fetch.
    #[serde(default = "default_asset_name")]
    pub asset_name: String,
    /// Location of the cached archive. Its existence alone marks a cache
    /// hit.
    pub cache_path: Utf8PathBuf,
    /// Directory the archive is extracted into.
    pub destination_dir: Utf8PathBuf,
    /// Optional digest the archive must match before extraction.
    #[serde(default)]
    pub expected_sha256: Option<Sha256Digest>,
}

impl PipelineConfig {
    /// Configuration for the default dataset with the given paths.
    ///
    /// # Examples
    ///
    /// ```
    /// use dataset_provisioner::config::{DEFAULT_ASSET_NAME, PipelineConfig};
    ///
    /// let config = PipelineConfig::new("cache/db.zip", "data");
    /// assert_eq!(config.asset_name, DEFAULT_ASSET_NAME);
    /// assert!(config.expected_sha256.is_none());
    /// ```
    #[must_use]
    pub fn new(cache_path: impl Into<Utf8PathBuf>, destination_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            release: ReleaseSource::default(),
            asset_name: default_asset_name(),
            cache_path: cache_path.into(),
            destination_dir: destination_dir.into(),
            expected_sha256: None,
        }
    }

    /// Require the archive to hash to `digest` before extraction.
    #[must_use]
    pub fn with_expected_sha256(mut self, digest: Sha256Digest) -> Self {
        self.expected_sha256 = Some(digest);
        self
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML, unknown keys,
    /// missing paths, or an invalid digest.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if its contents are invalid.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

fn default_asset_name() -> String {
    DEFAULT_ASSET_NAME.to_owned()
}
