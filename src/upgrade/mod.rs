//! Binary update and integrity verification.
//!
//! This module keeps one platform-specific binary current: it asks a release
//! endpoint for the newest version, downloads the matching artifact,
//! verifies it against a published SHA-256 digest and swaps it into place
//! without ever exposing a partial or unverified file.
//!
//! # Architecture Overview
//!
//! - **[`DownloadCoordinator`]**: single-flight orchestration, session
//!   lifecycle, cancellation and lifecycle events
//! - **[`ReleaseOracle`]**: release discovery; [`HttpReleaseOracle`] talks to
//!   the distribution server
//! - **[`AtomicInstaller`]**: staged download, verification and atomic swap
//! - **[`IntegrityVerifier`]**: SHA-256 digests and constant-shape comparison
//! - **[`RecoveryPolicy`]**: failure classification, one automatic retry and
//!   user-facing notices
//! - **[`StateStore`]**: persistence of [`InstalledBinaryState`]
//!
//! ## Update Process Flow
//!
//! ```text
//! 1. Session
//!    ├── Return immediately if a session already runs
//!    └── Skip if the last check is recent and nothing forces one
//!
//! 2. Release check
//!    ├── Query the version endpoint for the configured channel
//!    └── Compare with the installed version component-wise
//!
//! 3. Install
//!    ├── Stop dependent processes
//!    ├── Stream the artifact into a staging file next to the target
//!    ├── Verify the staging file against the published digest
//!    ├── Rename it over the target
//!    └── Restart dependent processes
//!
//! 4. Record
//!    └── Persist version, digest, protocol version and check time
//! ```
//!
//! # Safety Mechanisms
//!
//! - The target path never holds unverified bytes; a failed or cancelled
//!   attempt leaves the previous binary in place
//! - Staging files are removed on every exit path
//! - A missing binary always forces a download, so an interrupted fallback
//!   copy heals on the next request
//!
//! # Usage Patterns
//!
//! ```bash
//! binguard update          # check and install if due
//! binguard update --force  # ignore the check interval
//! binguard check           # report the latest release only
//! binguard verify          # re-hash the installed binary
//! ```

/// Update settings: endpoints, channel, intervals and install location.
pub mod config;
/// Single-flight download sessions and the update state machine.
pub mod coordinator;
/// Processes that hold the managed binary open.
pub mod dependent;
/// Lifecycle events for hosts that observe sessions.
pub mod events;
/// Staged, verified and atomic installation of one artifact.
pub mod installer;
/// Operating system and architecture detection.
pub mod platform;
/// Failure classification, automatic retry and user notices.
pub mod recovery;
/// Release discovery.
pub mod release;
/// Whether a release check is due.
pub mod staleness;
/// Persisted state of the installed binary.
pub mod state;
/// SHA-256 digests and manifests.
pub mod verification;
/// Version comparison.
pub mod version_check;

pub use config::{ReleaseChannel, UpdateConfig};
pub use coordinator::{
    CoordinatorBuilder, DownloadCoordinator, DownloadSession, ReleaseCheck, UpdateOutcome,
};
pub use dependent::DependentProcess;
pub use events::{DownloadEvent, DownloadFinished, DownloadState};
pub use installer::AtomicInstaller;
pub use platform::{PlatformKind, PlatformTarget};
pub use recovery::{FailureNotice, FailureStage, Notifier, PromptAction, RecoveryPolicy};
pub use release::{HttpReleaseOracle, ReleaseDescriptor, ReleaseOracle};
pub use state::{InstalledBinaryState, JsonStateStore, MemoryStateStore, StateStore};
pub use verification::{IntegrityManifest, IntegrityVerifier};
pub use version_check::{is_newer, validate_version};
