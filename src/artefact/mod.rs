//! Release asset resolution, download, verification, and extraction.
//!
//! # Sub-modules
//!
//! - [`extraction`] - Zip extraction with path traversal protection.
//! - [`fetch`] - Chunked, atomic HTTP download of an asset.
//! - [`progress`] - Transfer progress values and reporters.
//! - [`release`] - Latest-release metadata parsing and asset lookup.
//! - [`sha256_digest`] - SHA-256 digest newtype (`Sha256Digest`).

pub mod extraction;
pub mod fetch;
mod http;
pub mod progress;
pub mod release;
pub mod sha256_digest;
