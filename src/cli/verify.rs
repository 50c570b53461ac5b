//! Re-hash the installed binary against the digest recorded at install time.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::cli::CliConfig;
use crate::cli::common::UpdateContext;

/// Arguments of `binguard verify`.
#[derive(Args, Debug)]
pub struct VerifyCommand {}

impl VerifyCommand {
    /// Verify the installed binary.
    ///
    /// # Errors
    ///
    /// Returns a checksum mismatch if the binary changed since it was
    /// installed, or an error if no digest was recorded.
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let ctx = UpdateContext::load(cli).await?;
        let state = ctx.coordinator.verify_installed().await?;

        println!(
            "{}",
            format!(
                "{} matches its recorded digest ({})",
                state.path.display(),
                state.sha256.as_deref().unwrap_or_default()
            )
            .green()
        );
        Ok(())
    }
}
