//! SHA-256 digest newtype for the optional archive verification hook.
//!
//! Digests are accepted as 64-character hexadecimal strings. Uppercase input
//! is normalised to lowercase so that values copied from release notes or
//! checksum files compare equal to the output of [`compute_sha256`].

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Expected length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Read buffer used while hashing files.
const HASH_BUFFER_LEN: usize = 64 * 1024;

/// A rejected digest string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid SHA-256 digest: {reason}")]
pub struct InvalidDigest {
    /// Description of the validation failure.
    pub reason: String,
}

/// A validated, lowercase hex-encoded SHA-256 digest.
///
/// # Examples
///
/// ```
/// use dataset_provisioner::artefact::sha256_digest::Sha256Digest;
///
/// let hex = "AB".repeat(32);
/// let digest = Sha256Digest::try_from(hex.as_str()).unwrap();
/// assert_eq!(digest.as_str(), "ab".repeat(32));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash `bytes` in memory.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = InvalidDigest;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_sha256(value)?;
        Ok(Self(value.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = InvalidDigest;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the SHA-256 digest of the file at `path`.
///
/// The file is streamed, so archives larger than memory hash fine.
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be opened or read.
pub fn compute_sha256(path: &Path) -> io::Result<Sha256Digest> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; HASH_BUFFER_LEN];
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(buffer.get(..read).unwrap_or_default());
    }
    Ok(Sha256Digest(format!("{:x}", hasher.finalize())))
}

fn validate_sha256(value: &str) -> Result<(), InvalidDigest> {
    if value.len() != DIGEST_HEX_LEN {
        return Err(InvalidDigest {
            reason: format!(
                "expected {DIGEST_HEX_LEN} hex characters, got {}",
                value.len()
            ),
        });
    }
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(InvalidDigest {
            reason: format!("non-hex character '{bad}'"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // SHA-256 of the ASCII string "hello".
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn accepts_lowercase_hex() {
        let digest = Sha256Digest::try_from(HELLO_SHA256).expect("valid digest");
        assert_eq!(digest.as_str(), HELLO_SHA256);
    }

    #[test]
    fn normalises_uppercase_hex() {
        let upper = HELLO_SHA256.to_ascii_uppercase();
        let digest = Sha256Digest::try_from(upper).expect("valid digest");
        assert_eq!(digest.as_str(), HELLO_SHA256);
    }

    #[rstest]
    #[case::too_short("abcdef")]
    #[case::too_long(&"a".repeat(65))]
    #[case::non_hex(&format!("{}g", "a".repeat(63)))]
    fn rejects_malformed_digests(#[case] value: &str) {
        assert!(Sha256Digest::try_from(value).is_err());
    }

    #[test]
    fn hashes_files_and_bytes_identically() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("payload.bin");
        std::fs::write(&path, b"hello").expect("write payload");

        let from_file = compute_sha256(&path).expect("hash file");
        assert_eq!(from_file.as_str(), HELLO_SHA256);
        assert_eq!(from_file, Sha256Digest::of_bytes(b"hello"));
    }

    #[test]
    fn hashing_a_missing_file_fails() {
        let temp = tempfile::tempdir().expect("temp dir");
        let result = compute_sha256(&temp.path().join("absent.bin"));
        assert!(result.is_err());
    }

    #[test]
    fn deserialises_through_validation() {
        let json = format!("\"{HELLO_SHA256}\"");
        let digest: Sha256Digest = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(digest.as_str(), HELLO_SHA256);

        let bad: Result<Sha256Digest, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
