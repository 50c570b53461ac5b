//! Checksum-verified, atomic installation of one artifact.
//!
//! The binary at the target path is, at every observable instant, either the
//! previously installed file or the newly verified one. This is enforced by
//! the layout of the operation rather than by locking:
//!
//! 1. A staging file is created in the **same directory** as the target, so
//!    the final move is a same-filesystem rename.
//! 2. The artifact is streamed into the staging file.
//! 3. The staging file is read back and verified against the expected digest.
//!    A mismatch discards it; the target is never touched.
//! 4. The staging file is made executable and renamed over the target. The
//!    rename replaces an existing file atomically.
//!
//! The staging file is a [`tempfile::NamedTempFile`], so every early return
//! (cancellation, network error, checksum mismatch) deletes it on drop.
//!
//! # Fallback when rename is unavailable
//!
//! If the filesystem refuses the rename (`CrossesDevices` or `Unsupported`),
//! the existing target is removed and the staging file is copied into place.
//! Between the removal and the end of the copy no complete binary exists at
//! the target path. A crash inside that window leaves the target missing; the
//! next update request treats a missing binary as a forced download.
//!
//! # Cancellation checkpoints
//!
//! The token is checked before the staging file is created, while waiting
//! for the response and between received chunks, and before and after
//! verification. Cancellation is cooperative: up to one chunk may be written
//! after the token fires.

use futures::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::{PROGRESS_EVENT_INTERVAL_BYTES, STAGING_SUFFIX};
use crate::core::UpdateError;
use crate::upgrade::events::{DownloadState, SessionReporter};
use crate::upgrade::state::InstalledBinaryState;
use crate::upgrade::verification::IntegrityVerifier;

/// Downloads an artifact and swaps it into place.
#[derive(Debug, Clone)]
pub struct AtomicInstaller {
    client: reqwest::Client,
    reporter: Option<SessionReporter>,
}

impl AtomicInstaller {
    /// Create an installer that downloads with `client`.
    pub const fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            reporter: None,
        }
    }

    /// Report state transitions and progress through `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: SessionReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    fn report_state(&self, state: DownloadState) {
        if let Some(reporter) = &self.reporter {
            reporter.state(state);
        }
    }

    fn report_progress(&self, downloaded: u64, total: Option<u64>) {
        if let Some(reporter) = &self.reporter {
            reporter.progress(downloaded, total);
        }
    }

    /// Install the artifact at `artifact_url` to `target_path`.
    ///
    /// Returns the state of the freshly installed binary. `version`,
    /// `last_checked_at` and `protocol_version` are left for the caller.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Cancelled`]: staging file removed, target untouched
    /// - [`UpdateError::Network`] / [`UpdateError::HttpStatus`]: target untouched
    /// - [`UpdateError::ChecksumMismatch`]: target untouched
    /// - [`UpdateError::Filesystem`]: target untouched unless the failure
    ///   happened inside the fallback copy
    pub async fn install(
        &self,
        target_path: &Path,
        artifact_url: &str,
        expected_digest_hex: &str,
        cancel: &CancellationToken,
    ) -> Result<InstalledBinaryState, UpdateError> {
        ensure_not_cancelled(cancel)?;

        let staging = create_staging_file(target_path)?;
        debug!("Staging download in {}", staging.path().display());

        self.report_state(DownloadState::Downloading);
        let bytes_written = self.download_into(&staging, artifact_url, cancel).await?;
        info!("Downloaded {} bytes from {}", bytes_written, artifact_url);

        ensure_not_cancelled(cancel)?;
        self.report_state(DownloadState::Verifying);
        let contents = tokio::fs::read(staging.path())
            .await
            .map_err(|e| UpdateError::filesystem("read staging file", staging.path(), &e))?;
        IntegrityVerifier::verify(expected_digest_hex, &contents)?;
        let sha256 = IntegrityVerifier::digest(&contents);
        drop(contents);
        ensure_not_cancelled(cancel)?;

        self.report_state(DownloadState::Installing);
        let executable_bit_set = set_executable(staging.path()).await?;
        swap_into_place(staging, target_path).await?;
        let executable_bit_set = executable_bit_set && set_executable(target_path).await?;

        info!("Installed {}", target_path.display());
        Ok(InstalledBinaryState {
            path: target_path.to_path_buf(),
            version: None,
            last_checked_at: None,
            executable_bit_set,
            sha256: Some(sha256),
            protocol_version: None,
        })
    }

    async fn download_into(
        &self,
        staging: &NamedTempFile,
        artifact_url: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, UpdateError> {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(UpdateError::Cancelled),
            response = self.client.get(artifact_url).send() => response?,
        };
        let response = response.error_for_status()?;
        let total = response.content_length();

        let handle = staging
            .as_file()
            .try_clone()
            .map_err(|e| UpdateError::filesystem("open staging file", staging.path(), &e))?;
        let mut file = tokio::fs::File::from_std(handle);
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;
        let mut last_reported = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Download cancelled after {} bytes", downloaded);
                    return Err(UpdateError::Cancelled);
                }
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| UpdateError::network("artifact download", e))?;

            file.write_all(&chunk)
                .await
                .map_err(|e| UpdateError::filesystem("write staging file", staging.path(), &e))?;
            downloaded += chunk.len() as u64;

            if downloaded - last_reported >= PROGRESS_EVENT_INTERVAL_BYTES {
                self.report_progress(downloaded, total);
                last_reported = downloaded;
            }
        }

        if let Some(expected) = total
            && downloaded < expected
        {
            return Err(UpdateError::network(
                "artifact download",
                format!("stream ended after {downloaded} of {expected} bytes"),
            ));
        }

        file.sync_all()
            .await
            .map_err(|e| UpdateError::filesystem("flush staging file", staging.path(), &e))?;
        self.report_progress(downloaded, total);
        Ok(downloaded)
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), UpdateError> {
    if cancel.is_cancelled() {
        return Err(UpdateError::Cancelled);
    }
    Ok(())
}

fn parent_dir(target_path: &Path) -> PathBuf {
    match target_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn create_staging_file(target_path: &Path) -> Result<NamedTempFile, UpdateError> {
    let dir = parent_dir(target_path);
    std::fs::create_dir_all(&dir)
        .map_err(|e| UpdateError::filesystem("create install directory", &dir, &e))?;

    let stem = target_path
        .file_name()
        .map_or_else(|| "binary".to_string(), |n| n.to_string_lossy().into_owned());

    tempfile::Builder::new()
        .prefix(&format!(".{stem}."))
        .suffix(STAGING_SUFFIX)
        .tempfile_in(&dir)
        .map_err(|e| UpdateError::filesystem("create staging file", &dir, &e))
}

/// Move the verified staging file over `target_path`.
async fn swap_into_place(staging: NamedTempFile, target_path: &Path) -> Result<(), UpdateError> {
    let err = match staging.persist(target_path) {
        Ok(_) => return Ok(()),
        Err(err) => err,
    };

    if !matches!(err.error.kind(), io::ErrorKind::CrossesDevices | io::ErrorKind::Unsupported) {
        return Err(UpdateError::filesystem("replace binary", target_path, &err.error));
    }

    warn!(
        "Atomic rename to {} unavailable ({}), falling back to copy",
        target_path.display(),
        err.error
    );
    let staging = err.file;

    // Race window: no complete binary exists at the target until the copy ends.
    match tokio::fs::remove_file(target_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(UpdateError::filesystem("remove old binary", target_path, &e)),
    }
    tokio::fs::copy(staging.path(), target_path)
        .await
        .map_err(|e| UpdateError::filesystem("copy binary", target_path, &e))?;

    if let Err(e) = staging.close() {
        warn!("Failed to remove staging file: {}", e);
    }
    Ok(())
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<bool, UpdateError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| UpdateError::filesystem("read permissions", path, &e))?;
    let mut perms = metadata.permissions();
    perms.set_mode(perms.mode() | 0o755);
    tokio::fs::set_permissions(path, perms)
        .await
        .map_err(|e| UpdateError::filesystem("set executable permission", path, &e))?;
    Ok(true)
}

#[cfg(not(unix))]
#[allow(clippy::unused_async)]
async fn set_executable(_path: &Path) -> Result<bool, UpdateError> {
    Ok(true)
}
