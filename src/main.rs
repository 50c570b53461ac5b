//! binguard CLI entry point
//!
//! Parses the command line, runs the selected command and renders failures
//! as user-friendly errors.
//!
//! Commands:
//! - `update` - Check for a new release and install it if due
//! - `check` - Report the latest release
//! - `status` - Show the installed binary and its check history
//! - `verify` - Re-hash the installed binary
//! - `platform` - Print the resolved artifact name

use anyhow::Result;
use binguard_cli::cli;
use binguard_cli::core::user_friendly_error;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
