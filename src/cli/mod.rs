//! Command-line interface for binguard.
//!
//! Each subcommand lives in its own module with an argument struct and an
//! `execute` method. Commands share the context built in [`common`]: the
//! loaded [`GlobalConfig`](crate::config::GlobalConfig), one HTTP client and
//! the [`DownloadCoordinator`](crate::upgrade::DownloadCoordinator) wired to
//! the persisted state file.
//!
//! # Available Commands
//!
//! - `update` - Check for a new release and install it if due
//! - `check` - Report the latest release without installing
//! - `status` - Show what is installed and when it was last checked
//! - `verify` - Re-hash the installed binary against its recorded digest
//! - `platform` - Print the artifact resolved for this machine
//!
//! # Examples
//!
//! ```bash
//! binguard update --force
//! binguard -vv check
//! binguard --config ./ci-config.toml status
//! ```

mod check;
pub mod common;
mod platform;
mod status;
mod update;
mod verify;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Runtime configuration derived from global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter directive; `RUST_LOG` takes precedence when set.
    pub log_level: String,

    /// Disable progress bars.
    pub no_progress: bool,

    /// Explicit configuration file.
    pub config_path: Option<PathBuf>,
}

/// Keeps a platform-specific binary current and verified.
#[derive(Parser, Debug)]
#[command(
    name = "binguard",
    about = "Keep a managed binary current and verified",
    version,
    long_about = "binguard downloads the platform build of a managed binary, verifies it \
                  against the published SHA-256 digest and installs it atomically."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check for a new release and install it if due
    Update(update::UpdateCommand),

    /// Report the latest release without installing
    Check(check::CheckCommand),

    /// Show the installed binary and its check history
    Status(status::StatusCommand),

    /// Re-hash the installed binary against its recorded digest
    Verify(verify::VerifyCommand),

    /// Print the artifact resolved for this machine
    Platform(platform::PlatformCommand),
}

impl Cli {
    /// Run the selected command.
    ///
    /// # Errors
    ///
    /// Returns the command's error; `main` renders it.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Derive runtime configuration from the global flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        };

        CliConfig {
            log_level: log_level.to_string(),
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    /// Run the selected command with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns the command's error.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        init_tracing(&config.log_level);

        match self.command {
            Commands::Update(cmd) => cmd.execute(&config).await,
            Commands::Check(cmd) => cmd.execute(&config).await,
            Commands::Status(cmd) => cmd.execute(&config).await,
            Commands::Verify(cmd) => cmd.execute(&config).await,
            Commands::Platform(cmd) => cmd.execute(),
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Ignore a second init; tests may run several commands in one process.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
