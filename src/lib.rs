//! Dataset provisioner library.
//!
//! This crate makes a large, externally published dataset available on local
//! disk. It looks up the newest GitHub release of a repository, downloads the
//! named zip asset to a cache path unless it is already there, and unpacks it
//! into a destination directory.
//!
//! # Modules
//!
//! - [`artefact`] - Release resolution, download, digest, and extraction
//! - [`config`] - Explicit pipeline configuration and TOML loading
//! - [`lock`] - Advisory lock serialising runs that share a cache path
//! - [`pipeline`] - Stage orchestration and the [`provision`] entry point
//!
//! The library emits diagnostics through the `log` facade and never installs
//! a logger of its own.

pub mod artefact;
pub mod config;
pub mod lock;
pub mod pipeline;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use config::{ConfigError, PipelineConfig, ReleaseSource};
pub use pipeline::{
    ArchiveSource, Pipeline, PipelineError, ProvisionReport, Stage, provision, provision_default,
};
