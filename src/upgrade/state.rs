//! Persisted knowledge about the installed binary.
//!
//! [`InstalledBinaryState`] is read to decide whether a check is due and is
//! written only after a verified install (or, for `last_checked_at`, after a
//! successful up-to-date check). Storage is abstracted by [`StateStore`] so the
//! host application can keep it next to its own settings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::UpdateError;

/// What is known about the binary at `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledBinaryState {
    /// Install location of the managed binary.
    pub path: PathBuf,
    /// Installed version, without a leading `v`.
    #[serde(default)]
    pub version: Option<String>,
    /// Last time the release endpoint confirmed this install was current.
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Whether the executable permission was applied after install.
    #[serde(default)]
    pub executable_bit_set: bool,
    /// SHA-256 of the installed binary, recorded at install time.
    #[serde(default)]
    pub sha256: Option<String>,
    /// Protocol version the binary was fetched for.
    #[serde(default)]
    pub protocol_version: Option<u32>,
}

impl InstalledBinaryState {
    /// State for a path nothing is known about.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            version: None,
            last_checked_at: None,
            executable_bit_set: false,
            sha256: None,
            protocol_version: None,
        }
    }

    /// Whether the installed binary was fetched for a protocol other than `required`.
    ///
    /// An unknown protocol version counts as a mismatch.
    pub fn protocol_mismatch(&self, required: u32) -> bool {
        self.protocol_version != Some(required)
    }

    /// Whether a file exists at `path`.
    pub async fn binary_exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

/// Storage for [`InstalledBinaryState`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the stored state, `None` if nothing was stored yet.
    async fn load(&self) -> Result<Option<InstalledBinaryState>, UpdateError>;

    /// Replace the stored state.
    async fn save(&self, state: &InstalledBinaryState) -> Result<(), UpdateError>;
}

/// JSON file backed [`StateStore`].
///
/// Writes go to a sibling temporary file that is renamed over the state file,
/// so a crash never leaves a truncated document behind.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    /// Store state in the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<Option<InstalledBinaryState>, UpdateError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(UpdateError::filesystem("read state", &self.path, &e)),
        };

        serde_json::from_str(&content).map(Some).map_err(|e| UpdateError::Config {
            message: format!("Invalid state file {}: {e}", self.path.display()),
        })
    }

    async fn save(&self, state: &InstalledBinaryState) -> Result<(), UpdateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| UpdateError::filesystem("create state directory", parent, &e))?;
        }

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| UpdateError::other(format!("Failed to serialize state: {e}")))?;

        let tmp = self.path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp, content).await.map_err(|e| UpdateError::filesystem("write state", &tmp, &e))?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(UpdateError::filesystem("replace state", &self.path, &e));
        }

        debug!("Saved binary state to {}", self.path.display());
        Ok(())
    }
}

/// In-memory [`StateStore`], counting saves.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<InstalledBinaryState>>,
    saves: AtomicUsize,
}

impl MemoryStateStore {
    /// Start with `state` already stored.
    pub fn with_state(state: InstalledBinaryState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Current stored state.
    pub async fn snapshot(&self) -> Option<InstalledBinaryState> {
        self.state.lock().await.clone()
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<InstalledBinaryState>, UpdateError> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &InstalledBinaryState) -> Result<(), UpdateError> {
        *self.state.lock().await = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
