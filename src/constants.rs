//! Global constants used throughout the binguard codebase.
//!
//! Timeouts, intervals and endpoint defaults that are shared between the
//! configuration layer, the update subsystem and the CLI.

/// Default distribution server.
pub const DEFAULT_BASE_URL: &str = "https://downloads.binguard.dev";

/// Path segment under the base URL that holds all binary releases.
pub const DEFAULT_ARTIFACT_PREFIX: &str = "cli";

/// Protocol version the host application speaks with the managed binary.
pub const DEFAULT_PROTOCOL_VERSION: u32 = 1;

/// Whole days between two release checks.
pub const DEFAULT_CHECK_INTERVAL_DAYS: u32 = 4;

/// Pause before the single automatic retry of a failed install (500ms).
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// How long a dependent process gets to release the binary before install proceeds.
pub const DEFAULT_DEPENDENT_STOP_TIMEOUT_SECS: u64 = 2;

/// TCP/TLS connect timeout for every request (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Automatic retries after the first failed install attempt.
///
/// Transient failures get exactly one silent retry before the user is asked.
pub const AUTOMATIC_RETRIES: usize = 1;

/// Suffix of the staging file created next to the target during download.
pub const STAGING_SUFFIX: &str = ".download";

/// Capacity of the lifecycle event channel.
///
/// Slow subscribers that fall further behind than this observe a lag error.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Minimum number of bytes between two progress events.
pub const PROGRESS_EVENT_INTERVAL_BYTES: u64 = 64 * 1024;

/// Marker file whose presence identifies a musl-based (Alpine) Linux.
pub const ALPINE_MARKER_FILE: &str = "/etc/alpine-release";

/// Environment variable overriding the global config location.
pub const CONFIG_PATH_ENV: &str = "BINGUARD_CONFIG_PATH";

/// Environment variable overriding the persisted state location.
pub const STATE_PATH_ENV: &str = "BINGUARD_STATE_PATH";

/// File name of the persisted binary state.
pub const STATE_FILE_NAME: &str = "state.json";

/// Support page shown with the "contact support" prompt action.
pub const SUPPORT_URL: &str = "https://support.binguard.dev";

