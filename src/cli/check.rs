//! Report the latest release without installing it.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::cli::CliConfig;
use crate::cli::common::UpdateContext;

/// Arguments of `binguard check`.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl CheckCommand {
    /// Query the release endpoint and compare with the installed version.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint is unreachable or a version cannot be compared.
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let ctx = UpdateContext::load(cli).await?;
        if !self.json {
            println!("{}", "Checking for a new release...".cyan());
        }

        let check = ctx.coordinator.check().await.context("Failed to check for a new release")?;

        if self.json {
            let value = serde_json::json!({
                "artifact": ctx.platform.artifact_name(),
                "channel": ctx.config.update.release_channel.to_string(),
                "installed_version": check.installed_version,
                "latest_version": check.latest.version,
                "artifact_url": check.latest.artifact_url,
                "update_available": check.update_available,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        let installed = check.installed_version.as_deref().unwrap_or("not installed");
        if check.update_available {
            println!(
                "{}",
                format!("Update available: {} -> {}", installed, check.latest.version).green()
            );
            println!("Run `binguard update --force` to install it");
        } else {
            println!("{}", format!("{} is the latest release", installed).green());
        }
        Ok(())
    }
}
