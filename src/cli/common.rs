//! Shared setup for commands that touch the managed binary.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::cli::CliConfig;
use crate::config::GlobalConfig;
use crate::upgrade::{
    DownloadCoordinator, HttpReleaseOracle, JsonStateStore, Notifier, PlatformTarget,
};

/// Everything a command needs to inspect or update the managed binary.
#[derive(Debug)]
pub struct UpdateContext {
    /// Loaded configuration
    pub config: GlobalConfig,
    /// Platform the artifact is resolved for
    pub platform: PlatformTarget,
    /// Location of the persisted state file
    pub state_path: PathBuf,
    /// Coordinator wired to the configured endpoints
    pub coordinator: DownloadCoordinator,
}

impl UpdateContext {
    /// Build the context with failures reported through the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded, the platform
    /// is unsupported or the HTTP client cannot be built.
    pub async fn load(cli: &CliConfig) -> Result<Self> {
        Self::load_with_notifier(cli, None).await
    }

    /// Build the context, sending failure notices to `notifier` if given.
    ///
    /// # Errors
    ///
    /// See [`UpdateContext::load`].
    pub async fn load_with_notifier(
        cli: &CliConfig,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Result<Self> {
        let config = GlobalConfig::load_with_optional(cli.config_path.clone()).await?;
        let state_path = GlobalConfig::state_path_for(cli.config_path.as_deref())?;
        let platform = PlatformTarget::current()?;
        let binary_path = config.update.resolve_binary_path(&platform)?;
        debug!(
            "Managing {} at {} (state in {})",
            platform.artifact_name(),
            binary_path.display(),
            state_path.display()
        );

        let client = config.network.build_client().context("Failed to configure HTTP client")?;
        let oracle =
            Arc::new(HttpReleaseOracle::new(client.clone(), config.update.clone(), platform));
        let store = Arc::new(JsonStateStore::new(&state_path));

        let mut builder = DownloadCoordinator::builder(config.update.clone(), oracle, store)
            .client(client)
            .binary_path(binary_path);
        if let Some(notifier) = notifier {
            builder = builder.notifier(notifier);
        }

        Ok(Self {
            config,
            platform,
            state_path,
            coordinator: builder.build()?,
        })
    }
}
