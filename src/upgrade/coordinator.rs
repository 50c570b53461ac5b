//! Single-flight orchestration of release checks and installs.
//!
//! [`DownloadCoordinator`] is the root of the update subsystem. It owns the
//! only piece of shared mutable state, the current [`DownloadSession`], and
//! drives one session through the state machine:
//!
//! ```text
//! Idle → CheckingVersion → Downloading → Verifying → Installing → Idle
//!              │                │             │
//!              └────────────────┴─────────────┴──→ Cancelled
//! ```
//!
//! # Single-flight
//!
//! Creating a session is one compare-and-set under a mutex. A caller that
//! finds a session already present gets [`UpdateOutcome::AlreadyInProgress`]
//! immediately: it does not queue, does not fail and performs no I/O. The
//! session is cleared by a drop guard on every exit path, before the
//! `Finished` event is published.
//!
//! # Persisted state
//!
//! The stored [`InstalledBinaryState`] is written after a verified install and
//! after a check that found the binary current. A failed attempt leaves
//! `last_checked_at` untouched, so the next trigger still considers the check due.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::NetworkConfig;
use crate::core::{ErrorKind, UpdateError};
use crate::upgrade::config::UpdateConfig;
use crate::upgrade::dependent::{self, DependentProcess};
use crate::upgrade::events::{
    DownloadEvent, DownloadFinished, DownloadState, EventBus, SessionReporter,
};
use crate::upgrade::installer::AtomicInstaller;
use crate::upgrade::platform::PlatformTarget;
use crate::upgrade::recovery::{FailureStage, Notifier, RecoveryPolicy, TracingNotifier};
use crate::upgrade::release::{ReleaseDescriptor, ReleaseOracle};
use crate::upgrade::staleness::is_check_due;
use crate::upgrade::state::{InstalledBinaryState, StateStore};
use crate::upgrade::verification::IntegrityVerifier;
use crate::upgrade::version_check::{is_newer, validate_version};

/// The in-flight download. At most one exists per coordinator.
#[derive(Debug)]
pub struct DownloadSession {
    id: Uuid,
    cancel_token: CancellationToken,
    started_at: DateTime<Utc>,
}

impl DownloadSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancel_token: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    /// Session id, also carried by lifecycle events.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// When the session was created.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Result of [`DownloadCoordinator::request_update`] that is not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Another session is running; nothing was done.
    AlreadyInProgress,
    /// Automatic binary management is switched off.
    NotManaged,
    /// The last check is recent enough.
    NotDue,
    /// The release endpoint offers nothing newer.
    UpToDate {
        /// Installed version
        version: Option<String>,
    },
    /// A new binary was verified and installed.
    Installed(InstalledBinaryState),
    /// The session was cancelled.
    Cancelled,
}

/// Result of a read-only release check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseCheck {
    /// Installed version, if known
    pub installed_version: Option<String>,
    /// Latest published release
    pub latest: ReleaseDescriptor,
    /// Whether `latest` is newer than the installed version
    pub update_available: bool,
}

/// How a session ended, and whether lifecycle events were published.
enum SessionResult {
    /// Ended before any work was announced.
    Quiet(Result<UpdateOutcome, UpdateError>),
    /// `Started` was emitted; `Finished` must follow.
    Announced(Result<UpdateOutcome, UpdateError>),
}

struct Inner {
    config: UpdateConfig,
    binary_path: PathBuf,
    client: reqwest::Client,
    oracle: Arc<dyn ReleaseOracle>,
    store: Arc<dyn StateStore>,
    dependents: Vec<Arc<dyn DependentProcess>>,
    recovery: RecoveryPolicy,
    events: EventBus,
    session: Mutex<Option<DownloadSession>>,
    idle: Notify,
}

impl Inner {
    fn session_slot(&self) -> std::sync::MutexGuard<'_, Option<DownloadSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the session it claimed when dropped.
struct SessionGuard<'a> {
    inner: &'a Inner,
    id: Uuid,
    cancel: CancellationToken,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        {
            let mut slot = self.inner.session_slot();
            // cancel() may already have cleared it and a new session may own the slot.
            if slot.as_ref().is_some_and(|s| s.id == self.id) {
                *slot = None;
            }
        }
        self.inner.idle.notify_waiters();
    }
}

/// Orchestrates release checks and installs of the managed binary.
///
/// Cloning is cheap; clones share the session and the event channel.
///
/// # Examples
///
/// ```rust,no_run
/// use binguard_cli::upgrade::{
///     DownloadCoordinator, HttpReleaseOracle, JsonStateStore, PlatformTarget, UpdateConfig,
/// };
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = UpdateConfig::default();
/// let platform = PlatformTarget::current()?;
/// let client = reqwest::Client::new();
/// let oracle = Arc::new(HttpReleaseOracle::new(client.clone(), config.clone(), platform));
/// let store = Arc::new(JsonStateStore::new("/tmp/binguard-state.json"));
///
/// let coordinator = DownloadCoordinator::builder(config, oracle, store)
///     .client(client)
///     .binary_path("/tmp/engine-linux")
///     .build()?;
/// let outcome = coordinator.request_update(false).await?;
/// println!("{outcome:?}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DownloadCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("binary_path", &self.inner.binary_path)
            .field("in_progress", &self.is_in_progress())
            .finish_non_exhaustive()
    }
}

/// Builder for [`DownloadCoordinator`].
pub struct CoordinatorBuilder {
    config: UpdateConfig,
    oracle: Arc<dyn ReleaseOracle>,
    store: Arc<dyn StateStore>,
    binary_path: Option<PathBuf>,
    client: Option<reqwest::Client>,
    dependents: Vec<Arc<dyn DependentProcess>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl CoordinatorBuilder {
    /// Install location; defaults to the configured or platform path.
    #[must_use]
    pub fn binary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_path = Some(path.into());
        self
    }

    /// HTTP client for artifact downloads; should match the oracle's policy.
    #[must_use]
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Register a process that must release the binary during install.
    #[must_use]
    pub fn dependent(mut self, dependent: Arc<dyn DependentProcess>) -> Self {
        self.dependents.push(dependent);
        self
    }

    /// Where failure notices go; defaults to the log.
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the coordinator.
    ///
    /// # Errors
    ///
    /// Fails if no binary path was given and none can be derived, or if the
    /// default HTTP client cannot be built.
    pub fn build(self) -> Result<DownloadCoordinator, UpdateError> {
        let binary_path = match self.binary_path {
            Some(path) => path,
            None => self.config.resolve_binary_path(&PlatformTarget::current()?)?,
        };
        let client = match self.client {
            Some(client) => client,
            None => NetworkConfig::default().build_client()?,
        };
        let notifier: Arc<dyn Notifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(TracingNotifier),
        };
        let recovery = RecoveryPolicy::new(self.config.retry_delay(), notifier);

        Ok(DownloadCoordinator {
            inner: Arc::new(Inner {
                config: self.config,
                binary_path,
                client,
                oracle: self.oracle,
                store: self.store,
                dependents: self.dependents,
                recovery,
                events: EventBus::new(),
                session: Mutex::new(None),
                idle: Notify::new(),
            }),
        })
    }
}

impl DownloadCoordinator {
    /// Start building a coordinator.
    pub fn builder(
        config: UpdateConfig,
        oracle: Arc<dyn ReleaseOracle>,
        store: Arc<dyn StateStore>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            oracle,
            store,
            binary_path: None,
            client: None,
            dependents: Vec::new(),
            notifier: None,
        }
    }

    /// Location of the managed binary.
    pub fn binary_path(&self) -> &std::path::Path {
        &self.inner.binary_path
    }

    /// Update configuration in use.
    pub fn config(&self) -> &UpdateConfig {
        &self.inner.config
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.inner.events.subscribe()
    }

    /// Whether a session exists. Never blocks on I/O.
    pub fn is_in_progress(&self) -> bool {
        self.inner.session_slot().is_some()
    }

    /// Signal the current session to stop and forget it.
    ///
    /// A no-op when nothing is running. The cancelled session unwinds at its
    /// next checkpoint; its staging file is removed on the way out.
    pub fn cancel(&self) {
        let session = self.inner.session_slot().take();
        if let Some(session) = session {
            info!("Cancelling download session {}", session.id);
            session.cancel_token.cancel();
            self.inner.idle.notify_waiters();
        }
    }

    /// Resolve once no session exists.
    pub async fn wait_for_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_in_progress() {
                return;
            }
            notified.await;
        }
    }

    /// Stored state for the managed binary.
    ///
    /// A stored state for a different path is ignored.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the state cannot be read.
    pub async fn installed_state(&self) -> Result<InstalledBinaryState, UpdateError> {
        let stored = self.inner.store.load().await?;
        Ok(match stored {
            Some(state) if state.path == self.inner.binary_path => state,
            Some(state) => {
                debug!(
                    "Ignoring stored state for {} (binary now at {})",
                    state.path.display(),
                    self.inner.binary_path.display()
                );
                InstalledBinaryState::new(&self.inner.binary_path)
            }
            None => InstalledBinaryState::new(&self.inner.binary_path),
        })
    }

    /// Whether a release check is due right now.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the state cannot be read.
    pub async fn is_check_due(&self) -> Result<bool, UpdateError> {
        let state = self.installed_state().await?;
        let forced = !state.binary_exists().await;
        Ok(is_check_due(
            state.last_checked_at,
            self.inner.config.check_interval_days,
            state.protocol_mismatch(self.inner.config.required_protocol_version),
            forced,
        ))
    }

    /// Re-hash the installed binary against the digest recorded at install time.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Other`] if no digest was recorded
    /// - [`UpdateError::Filesystem`] if the binary cannot be read
    /// - [`UpdateError::ChecksumMismatch`] if the binary changed on disk
    pub async fn verify_installed(&self) -> Result<InstalledBinaryState, UpdateError> {
        let state = self.installed_state().await?;
        let Some(expected) = state.sha256.as_deref() else {
            return Err(UpdateError::other(format!(
                "No recorded digest for {}; run an update first",
                state.path.display()
            )));
        };
        IntegrityVerifier::verify_file(&state.path, expected).await?;
        Ok(state)
    }

    /// Ask the release endpoint for the latest version without installing.
    ///
    /// Does not create a session and does not touch persisted state.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Network`] if the endpoint is unreachable
    /// - [`UpdateError::MalformedVersion`] if a version cannot be compared
    pub async fn check(&self) -> Result<ReleaseCheck, UpdateError> {
        let state = self.installed_state().await?;
        let latest = self.inner.oracle.fetch_latest().await.ok_or_else(|| {
            UpdateError::network("release check", "release endpoint unavailable")
        })?;
        let update_available = is_newer(state.version.as_deref(), Some(&latest.version))?;
        Ok(ReleaseCheck {
            installed_version: state.version,
            latest,
            update_available,
        })
    }

    /// Check for a release and install it if needed.
    ///
    /// When a session already exists this returns
    /// [`UpdateOutcome::AlreadyInProgress`] without doing anything. Otherwise a
    /// session is created, driven to completion and cleared before returning.
    /// A missing binary is treated like `force`.
    ///
    /// Failures are classified, surfaced through the notifier and published
    /// as `Finished { success: false }` before being returned.
    ///
    /// # Errors
    ///
    /// Any [`UpdateError`] except [`UpdateError::Cancelled`], which is reported
    /// as [`UpdateOutcome::Cancelled`].
    pub async fn request_update(&self, force: bool) -> Result<UpdateOutcome, UpdateError> {
        if !self.inner.config.manage_binaries_automatically {
            debug!("Automatic binary management disabled");
            return Ok(UpdateOutcome::NotManaged);
        }

        let Some(guard) = self.claim_session() else {
            return Ok(UpdateOutcome::AlreadyInProgress);
        };
        let reporter = SessionReporter::new(self.inner.events.clone(), guard.id);

        let result = self.run_session(&guard.cancel, &reporter, force).await;
        drop(guard);

        match result {
            SessionResult::Quiet(result) => result,
            SessionResult::Announced(result) => {
                reporter.state(DownloadState::Idle);
                self.inner.events.emit(DownloadEvent::Finished(finished_event(
                    reporter.session_id(),
                    &result,
                )));
                result
            }
        }
    }

    fn claim_session(&self) -> Option<SessionGuard<'_>> {
        let mut slot = self.inner.session_slot();
        if let Some(existing) = slot.as_ref() {
            debug!(
                "Update session {} running since {}, not starting another",
                existing.id(),
                existing.started_at()
            );
            return None;
        }

        let session = DownloadSession::new();
        let guard = SessionGuard {
            inner: &self.inner,
            id: session.id,
            cancel: session.cancel_token.clone(),
        };
        *slot = Some(session);
        Some(guard)
    }

    async fn run_session(
        &self,
        cancel: &CancellationToken,
        reporter: &SessionReporter,
        force: bool,
    ) -> SessionResult {
        let inner = &*self.inner;

        let state = match self.installed_state().await {
            Ok(state) => state,
            Err(e) => return SessionResult::Quiet(Err(e)),
        };
        let missing = !state.binary_exists().await;
        if missing {
            info!("No binary at {}, downloading unconditionally", state.path.display());
        }
        let forced = force || missing;
        let mismatch = state.protocol_mismatch(inner.config.required_protocol_version);

        if !is_check_due(state.last_checked_at, inner.config.check_interval_days, mismatch, forced) {
            debug!("Release check not due yet");
            return SessionResult::Quiet(Ok(UpdateOutcome::NotDue));
        }

        inner.events.emit(DownloadEvent::Started {
            session_id: reporter.session_id(),
        });
        SessionResult::Announced(self.check_and_install(state, cancel, reporter, forced, mismatch).await)
    }

    async fn check_and_install(
        &self,
        mut state: InstalledBinaryState,
        cancel: &CancellationToken,
        reporter: &SessionReporter,
        forced: bool,
        mismatch: bool,
    ) -> Result<UpdateOutcome, UpdateError> {
        let inner = &*self.inner;
        reporter.state(DownloadState::CheckingVersion);

        let latest = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(cancelled(reporter)),
            latest = inner.oracle.fetch_latest() => latest,
        };
        let Some(release) = latest else {
            let err = UpdateError::network("release info", "release endpoint unavailable");
            inner.recovery.on_failure(&err, FailureStage::ReleaseInfo);
            return Err(err);
        };
        if let Err(e) = validate_version(&release.version) {
            inner.recovery.on_failure(&e, FailureStage::Install);
            return Err(e);
        }

        if !forced && !mismatch {
            let newer = match is_newer(state.version.as_deref(), Some(&release.version)) {
                Ok(newer) => newer,
                Err(e) => {
                    inner.recovery.on_failure(&e, FailureStage::Install);
                    return Err(e);
                }
            };
            if !newer {
                info!("Installed version {:?} is current", state.version);
                state.last_checked_at = Some(Utc::now());
                inner.store.save(&state).await?;
                return Ok(UpdateOutcome::UpToDate {
                    version: state.version,
                });
            }
        }

        info!("Installing version {} to {}", release.version, inner.binary_path.display());
        dependent::stop_all(&inner.dependents, inner.config.dependent_stop_timeout()).await;
        let installed = self.install_with_recovery(&release, cancel, reporter).await;
        dependent::restart_all(&inner.dependents).await;

        let installed = match installed {
            Ok(installed) => installed,
            Err(UpdateError::Cancelled) => return Ok(cancelled(reporter)),
            Err(e) => {
                inner.recovery.on_failure(&e, FailureStage::Install);
                return Err(e);
            }
        };

        let new_state = InstalledBinaryState {
            version: Some(release.version.clone()),
            last_checked_at: Some(Utc::now()),
            protocol_version: Some(inner.config.required_protocol_version),
            ..installed
        };
        if let Err(e) = inner.store.save(&new_state).await {
            warn!("Installed {} but failed to record state: {}", release.version, e);
            inner.recovery.on_failure(&e, FailureStage::Install);
            return Err(e);
        }

        info!("Updated to version {}", release.version);
        Ok(UpdateOutcome::Installed(new_state))
    }

    async fn install_with_recovery(
        &self,
        release: &ReleaseDescriptor,
        cancel: &CancellationToken,
        reporter: &SessionReporter,
    ) -> Result<InstalledBinaryState, UpdateError> {
        let inner = &*self.inner;
        let installer = AtomicInstaller::new(inner.client.clone()).with_reporter(reporter.clone());
        let installer = &installer;
        let target = inner.binary_path.as_path();

        let attempts = inner.recovery.run(|| async move {
            let manifest = inner.oracle.fetch_manifest(release).await?;
            installer.install(target, &release.artifact_url, &manifest.expected_digest_hex, cancel).await
        });

        match inner.config.operation_timeout() {
            Some(limit) => tokio::time::timeout(limit, attempts).await.unwrap_or_else(|_| {
                Err(UpdateError::network(
                    "update",
                    format!("did not complete within {}s", limit.as_secs()),
                ))
            }),
            None => attempts.await,
        }
    }
}

fn cancelled(reporter: &SessionReporter) -> UpdateOutcome {
    info!("Update session {} cancelled", reporter.session_id());
    reporter.state(DownloadState::Cancelled);
    UpdateOutcome::Cancelled
}

fn finished_event(
    session_id: Uuid,
    result: &Result<UpdateOutcome, UpdateError>,
) -> DownloadFinished {
    let (success, installed_version, error) = match result {
        Ok(UpdateOutcome::Installed(state)) => (true, state.version.clone(), None),
        Ok(UpdateOutcome::UpToDate { version }) => (true, version.clone(), None),
        Ok(UpdateOutcome::Cancelled) => (false, None, Some(ErrorKind::Cancelled)),
        Ok(_) => (true, None, None),
        Err(e) => (false, None, Some(e.kind())),
    };
    DownloadFinished {
        session_id,
        success,
        installed_version,
        error,
    }
}
