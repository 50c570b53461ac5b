//! binguard - keep a platform-specific binary current and verified
//!
//! A host application ships without the heavy binary it drives (a language
//! server, an analysis engine) and lets binguard fetch the right build for the
//! machine, verify it against a published SHA-256 digest and install it
//! atomically. Checks are rate-limited, concurrent requests collapse into one
//! download, and a failed or cancelled attempt never leaves a partial file
//! behind.
//!
//! # Core Modules
//!
//! - [`upgrade`] - Release discovery, download sessions, verification and installation
//! - [`config`] - Global configuration (`~/.binguard/config.toml`) and HTTP policy
//! - [`core`] - Error taxonomy and user-facing error rendering
//! - [`cli`] - Command-line interface
//! - [`utils`] - Terminal progress
//!
//! # Configuration (~/.binguard/config.toml)
//!
//! ```toml
//! [update]
//! base_url = "https://downloads.binguard.dev"
//! release_channel = "stable"
//! check_interval_days = 4
//!
//! [network]
//! connect_timeout_secs = 30
//! ```
//!
//! # Embedding
//!
//! ```rust,no_run
//! use binguard_cli::config::GlobalConfig;
//! use binguard_cli::upgrade::{
//!     DownloadCoordinator, HttpReleaseOracle, JsonStateStore, PlatformTarget,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GlobalConfig::load().await?;
//! let platform = PlatformTarget::current()?;
//! let client = config.network.build_client()?;
//! let oracle = Arc::new(HttpReleaseOracle::new(client.clone(), config.update.clone(), platform));
//! let store = Arc::new(JsonStateStore::new(GlobalConfig::default_state_path()?));
//!
//! let coordinator = DownloadCoordinator::builder(config.update, oracle, store)
//!     .client(client)
//!     .build()?;
//! coordinator.request_update(false).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod upgrade;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
