use crate::constants::{
    DEFAULT_ARTIFACT_PREFIX, DEFAULT_BASE_URL, DEFAULT_CHECK_INTERVAL_DAYS,
    DEFAULT_DEPENDENT_STOP_TIMEOUT_SECS, DEFAULT_PROTOCOL_VERSION, DEFAULT_RETRY_DELAY_MS,
};
use crate::core::UpdateError;
use crate::upgrade::platform::PlatformTarget;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Release stream a binary is fetched from.
///
/// Each channel publishes its own latest-version marker; artifacts of every
/// channel share the versioned download tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    /// Production releases
    #[default]
    Stable,
    /// Release candidates
    Rc,
    /// Nightly previews
    Preview,
}

impl fmt::Display for ReleaseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stable => "stable",
            Self::Rc => "rc",
            Self::Preview => "preview",
        })
    }
}

/// Configuration settings for managed binary updates.
///
/// `UpdateConfig` decides where releases are discovered, how often the
/// release endpoint is consulted and how failures are retried. It lives under
/// the `[update]` table of the global configuration file.
///
/// # Update Timing
/// - **Check interval**: whole days between two release checks (default 4)
/// - **Protocol version**: a change forces a check regardless of elapsed time
///
/// # Endpoints
///
/// All URLs derive from `base_url` and `artifact_prefix`:
///
/// ```text
/// <base>/<prefix>/<channel>/ls-protocol-version-<N>   latest version marker
/// <base>/<prefix>/v<version>/<artifact>               binary
/// <base>/<prefix>/v<version>/<artifact>.sha256        checksum
/// ```
///
/// # TOML Example
/// ```toml
/// [update]
/// base_url = "https://downloads.binguard.dev"
/// release_channel = "stable"
/// required_protocol_version = 1
/// check_interval_days = 4
/// manage_binaries_automatically = true
/// retry_delay_ms = 500
/// ```
///
/// # Examples
///
/// ```rust,no_run
/// use binguard_cli::upgrade::config::{ReleaseChannel, UpdateConfig};
///
/// let config = UpdateConfig::default();
/// assert_eq!(config.release_channel, ReleaseChannel::Stable);
/// assert_eq!(
///     config.version_url(),
///     "https://downloads.binguard.dev/cli/stable/ls-protocol-version-1"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Root of the distribution server.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Release stream to follow.
    #[serde(default)]
    pub release_channel: ReleaseChannel,

    /// Protocol version the host application requires from the binary.
    ///
    /// Installed binaries fetched for a different protocol version are
    /// re-checked immediately.
    #[serde(default = "default_protocol_version")]
    pub required_protocol_version: u32,

    /// Whole days between two release checks.
    #[serde(default = "default_check_interval_days")]
    pub check_interval_days: u32,

    /// Whether binguard downloads and replaces the binary on its own.
    ///
    /// When `false`, `update` never touches the network and the binary at
    /// `binary_path` is expected to be managed by the user.
    #[serde(default = "default_true")]
    pub manage_binaries_automatically: bool,

    /// Location of the managed binary.
    ///
    /// Defaults to `<data dir>/binguard/<artifact name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_path: Option<PathBuf>,

    /// Path segment under `base_url` that holds releases.
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,

    /// Pause before the automatic retry, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Seconds a dependent process gets to release the binary.
    #[serde(default = "default_dependent_stop_timeout_secs")]
    pub dependent_stop_timeout_secs: u64,

    /// Overall deadline for one download attempt, in seconds.
    ///
    /// Unset means no deadline beyond the HTTP client's own timeouts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_secs: Option<u64>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            release_channel: ReleaseChannel::default(),
            required_protocol_version: default_protocol_version(),
            check_interval_days: default_check_interval_days(),
            manage_binaries_automatically: true,
            binary_path: None,
            artifact_prefix: default_artifact_prefix(),
            retry_delay_ms: default_retry_delay_ms(),
            dependent_stop_timeout_secs: default_dependent_stop_timeout_secs(),
            operation_timeout_secs: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

const fn default_protocol_version() -> u32 {
    DEFAULT_PROTOCOL_VERSION
}

const fn default_check_interval_days() -> u32 {
    DEFAULT_CHECK_INTERVAL_DAYS
}

const fn default_true() -> bool {
    true
}

fn default_artifact_prefix() -> String {
    DEFAULT_ARTIFACT_PREFIX.to_string()
}

const fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

const fn default_dependent_stop_timeout_secs() -> u64 {
    DEFAULT_DEPENDENT_STOP_TIMEOUT_SECS
}

impl UpdateConfig {
    /// Create an `UpdateConfig` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a default configuration pointing at another distribution server.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    fn release_root(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.artifact_prefix.trim_matches('/')
        )
    }

    /// URL of the latest-version marker for the configured channel and protocol.
    pub fn version_url(&self) -> String {
        format!(
            "{}/{}/ls-protocol-version-{}",
            self.release_root(),
            self.release_channel,
            self.required_protocol_version
        )
    }

    /// URL of a released artifact.
    ///
    /// A leading `v` on `version` is tolerated and not doubled.
    pub fn artifact_url(&self, version: &str, artifact_name: &str) -> String {
        format!(
            "{}/v{}/{}",
            self.release_root(),
            version.trim_start_matches('v'),
            artifact_name
        )
    }

    /// Delay before the automatic retry.
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Time a dependent process gets to stop.
    pub const fn dependent_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.dependent_stop_timeout_secs)
    }

    /// Overall deadline for one download attempt, if configured.
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }

    /// Resolve the managed binary location for `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Config`] when no `binary_path` is configured and
    /// the platform data directory cannot be determined.
    pub fn resolve_binary_path(&self, platform: &PlatformTarget) -> Result<PathBuf, UpdateError> {
        if let Some(path) = &self.binary_path {
            return Ok(path.clone());
        }

        let data_dir = dirs::data_local_dir().ok_or_else(|| UpdateError::Config {
            message: "Unable to determine local data directory; set update.binary_path".to_string(),
        })?;
        Ok(data_dir.join("binguard").join(platform.artifact_name()))
    }
}
