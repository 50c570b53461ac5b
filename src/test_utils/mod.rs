//! Test utilities for binguard.
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration suite. Everything here is deterministic and offline; HTTP
//! endpoints are mocked in the integration tests themselves.
//!
//! - [`init_test_logging`] - once-guarded tracing setup
//! - [`ArtifactFixture`] - a fake binary and its published digest
//! - [`RecordingNotifier`] - captures failure notices
//! - [`RecordingDependent`] - records stop/restart calls

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::core::UpdateError;
use crate::upgrade::{DependentProcess, FailureNotice, IntegrityVerifier, Notifier};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` if given, otherwise `RUST_LOG`. Without either nothing is
/// logged. Safe to call from every test.
///
/// ```rust,no_run
/// binguard_cli::test_utils::init_test_logging(Some(tracing::Level::DEBUG));
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// A fake binary payload and its SHA-256.
#[derive(Debug, Clone)]
pub struct ArtifactFixture {
    /// Artifact bytes
    pub bytes: Vec<u8>,
    /// Lowercase hex digest of `bytes`
    pub sha256: String,
}

impl ArtifactFixture {
    /// Deterministic payload of `len` bytes, tagged with `version`.
    pub fn new(version: &str, len: usize) -> Self {
        let header = format!("#!/bin/sh\necho engine {version}\n");
        let mut bytes = header.into_bytes();
        let mut seed = 0x2545_f491_u32;
        while bytes.len() < len {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            bytes.push((seed & 0xff) as u8);
        }
        bytes.truncate(len.max(1));
        let sha256 = IntegrityVerifier::digest(&bytes);
        Self { bytes, sha256 }
    }

    /// Body of the `.sha256` file as published next to the artifact.
    pub fn checksum_body(&self, artifact_name: &str) -> String {
        format!("{}  {}\n", self.sha256, artifact_name)
    }

    /// Same length, one byte flipped: a corrupted transfer.
    pub fn corrupted(&self) -> Vec<u8> {
        let mut bytes = self.bytes.clone();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        bytes
    }
}

/// [`Notifier`] that keeps every notice.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<FailureNotice>>,
}

impl RecordingNotifier {
    /// Notices received so far.
    pub fn notices(&self) -> Vec<FailureNotice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &FailureNotice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice.clone());
        }
    }
}

/// [`DependentProcess`] that counts stop and restart calls.
#[derive(Debug)]
pub struct RecordingDependent {
    name: String,
    stops: AtomicUsize,
    restarts: AtomicUsize,
    fail_stop: bool,
}

impl RecordingDependent {
    /// A dependent that stops and restarts cleanly.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stops: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
            fail_stop: false,
        }
    }

    /// A dependent whose `stop` always fails.
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            fail_stop: true,
            ..Self::new(name)
        }
    }

    /// Number of `stop` calls.
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Number of `restart` calls.
    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DependentProcess for RecordingDependent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stop(&self) -> Result<(), UpdateError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            return Err(UpdateError::other(format!("{} refused to stop", self.name)));
        }
        Ok(())
    }

    async fn restart(&self) -> Result<(), UpdateError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
