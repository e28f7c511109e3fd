//! BDD tests for the dataset provisioning workflow.

use camino::Utf8PathBuf;
use dataset_provisioner::artefact::extraction::ZipExtractor;
use dataset_provisioner::artefact::fetch::{ArtifactFetcher, FetchError};
use dataset_provisioner::artefact::release::{ReleaseResolver, ResolutionError};
use dataset_provisioner::artefact::sha256_digest::Sha256Digest;
use dataset_provisioner::test_utils::{write_zip, zip_bytes};
use dataset_provisioner::{ArchiveSource, Pipeline, PipelineConfig, PipelineError, ProvisionReport};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::Cell;
use std::path::Path;

const ASSET_URL: &str = "https://example.test/download/tipitaka-translation-data.db.zip";
const LATEST_URL: &str = "https://api.example.test/repos/dpd/db/releases/latest";

/// How the stub resolver answers.
#[derive(Clone, Copy, Default)]
enum Lookup {
    #[default]
    Found,
    AssetMissing,
    NetworkDown,
}

struct StubResolver {
    lookup: Lookup,
    calls: Cell<usize>,
}

impl ReleaseResolver for StubResolver {
    fn resolve_asset_url(&self, asset_name: &str) -> Result<String, ResolutionError> {
        self.calls.set(self.calls.get() + 1);
        match self.lookup {
            Lookup::Found => Ok(ASSET_URL.to_owned()),
            Lookup::AssetMissing => Err(ResolutionError::NotFound {
                asset: asset_name.to_owned(),
                url: LATEST_URL.to_owned(),
            }),
            Lookup::NetworkDown => Err(ResolutionError::Network {
                url: LATEST_URL.to_owned(),
                reason: "connection refused".to_owned(),
            }),
        }
    }
}

/// Fetcher that writes `body` or fails as if the connection dropped.
struct StubFetcher {
    body: Option<Vec<u8>>,
}

impl ArtifactFetcher for StubFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
        let Some(body) = &self.body else {
            return Err(FetchError::Network {
                url: url.to_owned(),
                reason: "response ended after 4096 of 1048576 bytes".to_owned(),
            });
        };
        let io_error = |source| FetchError::Io {
            path: destination.to_path_buf(),
            source,
        };
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(destination, body).map_err(io_error)
    }
}

struct ProvisioningWorld {
    _temp_dir: tempfile::TempDir,
    root: Utf8PathBuf,
    config: PipelineConfig,
    lookup: Lookup,
    archive: Option<Vec<u8>>,
    lookups_made: usize,
    result: Option<Result<ProvisionReport, PipelineError>>,
}

impl ProvisioningWorld {
    fn result(&self) -> &Result<ProvisionReport, PipelineError> {
        self.result.as_ref().expect("provisioning was run")
    }
}

fn dataset_archive() -> Vec<u8> {
    zip_bytes(&[("tipitaka-translation-data.db", "SQLite format 3")]).expect("zip")
}

#[fixture]
fn world() -> ProvisioningWorld {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).expect("UTF-8 path");
    let config = PipelineConfig::new(
        root.join("cache").join("tipitaka-translation-data.db.zip"),
        root.join("resources").join("tpr"),
    );
    ProvisioningWorld {
        _temp_dir: temp_dir,
        root,
        config,
        lookup: Lookup::default(),
        archive: None,
        lookups_made: 0,
        result: None,
    }
}

#[given("a published release containing the dataset archive")]
fn given_release_with_asset(world: &mut ProvisioningWorld) {
    world.lookup = Lookup::Found;
    world.archive = Some(dataset_archive());
}

#[given("a published release without the dataset archive")]
fn given_release_without_asset(world: &mut ProvisioningWorld) {
    world.lookup = Lookup::AssetMissing;
}

#[given("a published release whose archive contains \"{entry}\"")]
fn given_release_with_entry(world: &mut ProvisioningWorld, entry: String) {
    world.lookup = Lookup::Found;
    let entries = [("readme.txt", "hello"), (entry.as_str(), "escaped")];
    world.archive = Some(zip_bytes(&entries).expect("zip"));
}

#[given("a cached dataset archive")]
fn given_cached_archive(world: &mut ProvisioningWorld) {
    let cache = world.config.cache_path.as_std_path();
    std::fs::create_dir_all(cache.parent().expect("parent")).expect("cache dir");
    write_zip(cache, &[("tipitaka-translation-data.db", "SQLite format 3")]).expect("zip");
}

#[given("a release lookup that fails with a network error")]
fn given_lookup_fails(world: &mut ProvisioningWorld) {
    world.lookup = Lookup::NetworkDown;
}

#[given("a download that fails part way")]
fn given_download_fails(world: &mut ProvisioningWorld) {
    world.archive = None;
}

#[given("an expected checksum that does not match")]
fn given_mismatching_checksum(world: &mut ProvisioningWorld) {
    world.config.expected_sha256 = Some(Sha256Digest::of_bytes(b"some other archive"));
}

#[when("the dataset is provisioned")]
fn when_provisioned(world: &mut ProvisioningWorld) {
    let resolver = StubResolver {
        lookup: world.lookup,
        calls: Cell::new(0),
    };
    let fetcher = StubFetcher {
        body: world.archive.clone(),
    };
    let result = Pipeline::new(&world.config, &resolver, &fetcher, &ZipExtractor).run();
    world.lookups_made = resolver.calls.get();
    world.result = Some(result);
}

#[then("the run succeeds from a download")]
fn then_succeeds_from_download(world: &mut ProvisioningWorld) {
    match world.result() {
        Ok(report) => assert!(
            matches!(report.source, ArchiveSource::Downloaded { .. }),
            "expected a download, got {report:?}"
        ),
        Err(err) => panic!("expected success, got {err}"),
    }
}

#[then("the run succeeds from the cache")]
fn then_succeeds_from_cache(world: &mut ProvisioningWorld) {
    match world.result() {
        Ok(report) => assert_eq!(report.source, ArchiveSource::Cached),
        Err(err) => panic!("expected success, got {err}"),
    }
}

#[then("the destination contains \"{file}\"")]
fn then_destination_contains(world: &mut ProvisioningWorld, file: String) {
    let path = world.config.destination_dir.join(&file);
    assert!(path.is_file(), "{path} was not extracted");
}

#[then("no release lookup was made")]
fn then_no_lookup(world: &mut ProvisioningWorld) {
    assert_eq!(world.lookups_made, 0);
}

#[then("the run fails at the \"{stage}\" stage")]
fn then_fails_at_stage(world: &mut ProvisioningWorld, stage: String) {
    match world.result() {
        Err(err) => assert_eq!(err.stage().to_string(), stage, "error was: {err}"),
        Ok(report) => panic!("expected failure at {stage}, got {report:?}"),
    }
}

#[then("no archive is cached")]
fn then_no_archive_cached(world: &mut ProvisioningWorld) {
    assert!(!world.config.cache_path.exists());
}

#[then("the destination was not created")]
fn then_destination_absent(world: &mut ProvisioningWorld) {
    assert!(!world.config.destination_dir.exists());
}

#[then("nothing was written outside the destination")]
fn then_nothing_escaped(world: &mut ProvisioningWorld) {
    assert!(!world.root.join("resources").join("escape.txt").exists());
    assert!(!world.config.destination_dir.join("readme.txt").exists());
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Fresh provisioning downloads and extracts the dataset"
)]
fn scenario_fresh_provisioning(world: ProvisioningWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "A cached archive skips the network"
)]
fn scenario_cached_archive(world: ProvisioningWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "A release without the asset fails resolution"
)]
fn scenario_missing_asset(world: ProvisioningWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "A failed download is never extracted"
)]
fn scenario_failed_download(world: ProvisioningWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "An archive with a traversal entry is refused"
)]
fn scenario_traversal_entry(world: ProvisioningWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "A checksum mismatch discards the download"
)]
fn scenario_checksum_mismatch(world: ProvisioningWorld) {
    let _ = world;
}
