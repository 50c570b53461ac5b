//! Show what is installed and when it was last checked.

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use colored::Colorize;

use crate::cli::CliConfig;
use crate::cli::common::UpdateContext;
use crate::upgrade::staleness::days_since;

/// Arguments of `binguard status`.
#[derive(Args, Debug)]
pub struct StatusCommand {}

impl StatusCommand {
    /// Print the persisted state of the managed binary. No network access.
    ///
    /// # Errors
    ///
    /// Fails if the configuration or the state file cannot be read.
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let ctx = UpdateContext::load(cli).await?;
        let state = ctx.coordinator.installed_state().await?;
        let present = state.binary_exists().await;
        let due = ctx.coordinator.is_check_due().await?;

        println!("{:<14} {}", "Artifact:".bold(), ctx.platform.artifact_name());
        println!("{:<14} {}", "Channel:".bold(), ctx.config.update.release_channel);
        println!(
            "{:<14} {}{}",
            "Binary:".bold(),
            state.path.display(),
            if present { String::new() } else { format!(" {}", "(missing)".red()) }
        );
        println!(
            "{:<14} {}",
            "Version:".bold(),
            state.version.as_deref().unwrap_or("unknown")
        );
        match days_since(Utc::now(), state.last_checked_at) {
            Some(days) => println!("{:<14} {} day(s) ago", "Last check:".bold(), days),
            None => println!("{:<14} never", "Last check:".bold()),
        }
        println!(
            "{:<14} {}",
            "Protocol:".bold(),
            state.protocol_version.map_or_else(|| "unknown".to_string(), |v| v.to_string())
        );
        if let Some(sha256) = &state.sha256 {
            println!("{:<14} {}", "SHA-256:".bold(), sha256);
        }
        println!("{:<14} {}", "State file:".bold(), ctx.state_path.display());

        if due {
            println!("{}", "A release check is due".yellow());
        } else {
            println!("{}", "No release check due".green());
        }
        Ok(())
    }
}
