//! SHA-256 integrity checks for downloaded artifacts.
//!
//! [`IntegrityVerifier`] hashes bytes and files. [`IntegrityManifest`] parses
//! the `<hex digest> <file name>` body of a published `.sha256` file.

use crate::core::UpdateError;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Length of a hex-encoded SHA-256 digest.
const SHA256_HEX_LEN: usize = 64;

/// Verifies the integrity of downloaded binaries using SHA-256.
///
/// Every artifact is published together with a `.sha256` file. The bytes
/// written to the staging file are hashed and compared against it before the
/// staging file is allowed anywhere near the install location.
///
/// # Security Benefits
///
/// - **Download Integrity**: Detects corrupted or truncated downloads
/// - **Tamper Detection**: Identifies binaries modified in transit
/// - **Drift Detection**: The stored digest lets `verify` catch later on-disk changes
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    /// Lowercase hex SHA-256 of `bytes`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use binguard_cli::upgrade::verification::IntegrityVerifier;
    ///
    /// let digest = IntegrityVerifier::digest(b"Hello, World!");
    /// assert_eq!(digest, "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f");
    /// ```
    pub fn digest(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Verify `bytes` against an expected hex digest.
    ///
    /// The comparison is case-insensitive: `expected_hex` is decoded and the
    /// raw digests are compared.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::ChecksumMismatch`] carrying both digests when they
    /// differ or when `expected_hex` is not valid hex.
    pub fn verify(expected_hex: &str, bytes: &[u8]) -> Result<(), UpdateError> {
        let actual = Sha256::digest(bytes);
        let expected = expected_hex.trim();

        let matches = hex::decode(expected).is_ok_and(|decoded| decoded.as_slice() == actual.as_slice());
        if !matches {
            return Err(UpdateError::ChecksumMismatch {
                expected: expected.to_string(),
                actual: hex::encode(actual),
            });
        }

        debug!("Checksum verified: {}", hex::encode(actual));
        Ok(())
    }

    /// Hash a file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Filesystem`] if the file cannot be read.
    pub async fn digest_file(path: &Path) -> Result<String, UpdateError> {
        debug!("Computing SHA-256 for {}", path.display());
        let contents =
            fs::read(path).await.map_err(|e| UpdateError::filesystem("read", path, &e))?;
        Ok(Self::digest(&contents))
    }

    /// Verify a file on disk against an expected hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Filesystem`] if the file cannot be read and
    /// [`UpdateError::ChecksumMismatch`] if the digests differ.
    pub async fn verify_file(path: &Path, expected_hex: &str) -> Result<(), UpdateError> {
        info!("Verifying checksum for {}", path.display());
        let contents =
            fs::read(path).await.map_err(|e| UpdateError::filesystem("read", path, &e))?;
        Self::verify(expected_hex, &contents)
    }
}

/// Expected digest of one artifact, parsed from its `.sha256` file.
///
/// The checksum file holds `"<hex digest> <file name>"`; only the first
/// whitespace-delimited token is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityManifest {
    /// Lowercase hex SHA-256 digest
    pub expected_digest_hex: String,
}

impl IntegrityManifest {
    /// Parse the body of a checksum file.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Other`] when the first token is missing or is not
    /// a 64-character hex string.
    pub fn parse(body: &str) -> Result<Self, UpdateError> {
        let token = body.split_whitespace().next().ok_or_else(|| {
            UpdateError::other("Checksum file is empty")
        })?;

        if token.len() != SHA256_HEX_LEN || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(UpdateError::other(format!(
                "Checksum file does not start with a SHA-256 digest: '{token}'"
            )));
        }

        Ok(Self {
            expected_digest_hex: token.to_ascii_lowercase(),
        })
    }

    /// Verify `bytes` against this manifest.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::ChecksumMismatch`] if the digests differ.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), UpdateError> {
        IntegrityVerifier::verify(&self.expected_digest_hex, bytes)
    }
}
