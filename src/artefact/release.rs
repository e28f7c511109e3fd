//! Latest-release lookup against the GitHub releases API.
//!
//! The resolver asks the `releases/latest` endpoint for the current
//! release and picks the asset whose name matches exactly. It makes a
//! single attempt; retry policy belongs to whoever runs the pipeline.

use crate::artefact::http::{describe_ureq_error, metadata_agent};
use crate::config::ReleaseSource;
use log::{debug, info};
use serde::Deserialize;

/// Media type recommended by GitHub for REST API requests.
const GITHUB_JSON: &str = "application/vnd.github+json";

/// Trait for resolving a release asset name to its download URL.
///
/// Abstractions allow tests to replace the network with canned answers.
#[cfg_attr(test, mockall::automock)]
pub trait ReleaseResolver {
    /// Return the download URL of the asset named `asset_name` in the
    /// latest release.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::NotFound`] when the latest release has no
    /// asset with that exact name, and [`ResolutionError::Network`] when the
    /// metadata cannot be fetched or decoded.
    fn resolve_asset_url(&self, asset_name: &str) -> Result<String, ResolutionError>;
}

/// Errors arising from release resolution.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// The latest release carries no asset with the requested name.
    #[error("asset {asset} not found in latest release at {url}")]
    NotFound {
        /// The asset name that was requested.
        asset: String,
        /// The release metadata URL that was queried.
        url: String,
    },

    /// The metadata request failed or returned an unusable body.
    #[error("release lookup failed for {url}: {reason}")]
    Network {
        /// The release metadata URL that was queried.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },
}

/// The fields of a release that the pipeline consumes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReleaseMetadata {
    /// Git tag of the release, when the API reports one.
    #[serde(default)]
    pub tag_name: Option<String>,
    /// Files attached to the release.
    #[serde(default)]
    pub assets: Vec<AssetDescriptor>,
}

/// One file attached to a release.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AssetDescriptor {
    /// File name of the asset.
    pub name: String,
    /// Direct download URL for the asset.
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

impl ReleaseMetadata {
    /// Find the download URL of the first asset named exactly `name`.
    ///
    /// The comparison is case-sensitive.
    ///
    /// # Examples
    ///
    /// ```
    /// use dataset_provisioner::artefact::release::parse_release_metadata;
    ///
    /// let release = parse_release_metadata(
    ///     r#"{"assets":[{"name":"data.zip","browser_download_url":"https://example.test/data.zip"}]}"#,
    /// )
    /// .unwrap();
    /// assert_eq!(release.asset_url("data.zip"), Some("https://example.test/data.zip"));
    /// assert_eq!(release.asset_url("DATA.zip"), None);
    /// ```
    #[must_use]
    pub fn asset_url(&self, name: &str) -> Option<&str> {
        self.assets
            .iter()
            .find(|asset| asset.name == name)
            .map(|asset| asset.download_url.as_str())
    }
}

/// Decode a release metadata document.
///
/// Fields other than `tag_name` and `assets` are ignored.
///
/// # Errors
///
/// Returns the `serde_json` error when the document is not valid JSON or
/// an asset lacks its name or download URL.
pub fn parse_release_metadata(json: &str) -> Result<ReleaseMetadata, serde_json::Error> {
    serde_json::from_str(json)
}

/// Resolver backed by the GitHub REST API via `ureq`.
#[derive(Debug, Clone)]
pub struct GithubReleaseResolver {
    latest_url: String,
}

impl GithubReleaseResolver {
    /// Build a resolver for the repository described by `source`.
    #[must_use]
    pub fn new(source: &ReleaseSource) -> Self {
        Self {
            latest_url: source.latest_release_url(),
        }
    }

    /// The endpoint this resolver queries.
    #[must_use]
    pub fn latest_url(&self) -> &str {
        &self.latest_url
    }

    fn fetch_metadata(&self) -> Result<ReleaseMetadata, ResolutionError> {
        let url = self.latest_url.as_str();
        let response = metadata_agent()
            .get(url)
            .header("Accept", GITHUB_JSON)
            .call()
            .map_err(|e| network_error(url, describe_ureq_error(&e)))?;
        let body = response
            .into_body()
            .read_to_string()
            .map_err(|e| network_error(url, describe_ureq_error(&e)))?;
        parse_release_metadata(&body)
            .map_err(|e| network_error(url, format!("malformed release metadata: {e}")))
    }
}

impl ReleaseResolver for GithubReleaseResolver {
    fn resolve_asset_url(&self, asset_name: &str) -> Result<String, ResolutionError> {
        debug!("querying {}", self.latest_url);
        let release = self.fetch_metadata()?;
        let tag = release.tag_name.as_deref().unwrap_or("<untagged>");
        match release.asset_url(asset_name) {
            Some(url) => {
                info!("latest release {tag} provides {asset_name}");
                Ok(url.to_owned())
            }
            None => Err(ResolutionError::NotFound {
                asset: asset_name.to_owned(),
                url: self.latest_url.clone(),
            }),
        }
    }
}

fn network_error(url: &str, reason: String) -> ResolutionError {
    ResolutionError::Network {
        url: url.to_owned(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn release() -> ReleaseMetadata {
        parse_release_metadata(
            r#"{
                "tag_name": "v2.1.0",
                "name": "Translations",
                "assets": [
                    {"name": "checksums.txt", "size": 10,
                     "browser_download_url": "https://example.test/checksums.txt"},
                    {"name": "tipitaka-translation-data.db.zip", "size": 2048,
                     "browser_download_url": "https://example.test/db.zip"},
                    {"name": "tipitaka-translation-data.db.zip.sig",
                     "browser_download_url": "https://example.test/db.zip.sig"}
                ]
            }"#,
        )
        .expect("valid release metadata")
    }

    #[rstest]
    fn finds_exact_match(release: ReleaseMetadata) {
        assert_eq!(
            release.asset_url("tipitaka-translation-data.db.zip"),
            Some("https://example.test/db.zip")
        );
        assert_eq!(release.tag_name.as_deref(), Some("v2.1.0"));
    }

    #[rstest]
    #[case::absent("missing.zip")]
    #[case::different_case("Tipitaka-Translation-Data.db.zip")]
    #[case::prefix_only("tipitaka-translation-data")]
    #[case::empty("")]
    fn rejects_names_without_an_exact_match(release: ReleaseMetadata, #[case] name: &str) {
        assert_eq!(release.asset_url(name), None);
    }

    #[rstest]
    fn match_is_independent_of_asset_order(release: ReleaseMetadata) {
        let mut reversed = release.clone();
        reversed.assets.reverse();
        for asset in &release.assets {
            assert_eq!(
                reversed.asset_url(&asset.name),
                Some(asset.download_url.as_str())
            );
        }
    }

    #[test]
    fn first_duplicate_wins() {
        let release = parse_release_metadata(
            r#"{"assets":[
                {"name":"a.zip","browser_download_url":"https://example.test/first"},
                {"name":"a.zip","browser_download_url":"https://example.test/second"}
            ]}"#,
        )
        .expect("valid");
        assert_eq!(release.asset_url("a.zip"), Some("https://example.test/first"));
    }

    #[test]
    fn missing_assets_array_means_no_assets() {
        let release = parse_release_metadata(r#"{"tag_name":"v1"}"#).expect("valid");
        assert!(release.assets.is_empty());
    }

    #[rstest]
    #[case::not_json("<html>rate limited</html>")]
    #[case::asset_without_url(r#"{"assets":[{"name":"a.zip"}]}"#)]
    #[case::assets_not_a_list(r#"{"assets":"a.zip"}"#)]
    fn rejects_malformed_metadata(#[case] json: &str) {
        assert!(parse_release_metadata(json).is_err());
    }

    #[test]
    fn resolver_targets_latest_endpoint() {
        let source = ReleaseSource {
            owner: "digitalpalidictionary".to_owned(),
            repo: "tipitaka-translation-db".to_owned(),
            api_base: "https://api.github.com".to_owned(),
        };
        let resolver = GithubReleaseResolver::new(&source);
        assert_eq!(
            resolver.latest_url(),
            "https://api.github.com/repos/digitalpalidictionary/tipitaka-translation-db/releases/latest"
        );
    }

    #[test]
    fn not_found_error_names_asset_and_url() {
        let err = ResolutionError::NotFound {
            asset: "data.zip".to_owned(),
            url: "https://example.test/latest".to_owned(),
        };
        let message = err.to_string();
        assert!(message.contains("data.zip"));
        assert!(message.contains("https://example.test/latest"));
    }
}
