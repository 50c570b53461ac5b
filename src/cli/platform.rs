//! Print the artifact resolved for this machine.

use anyhow::Result;
use clap::Args;

use crate::upgrade::PlatformTarget;

/// Arguments of `binguard platform`.
#[derive(Args, Debug)]
pub struct PlatformCommand {}

impl PlatformCommand {
    /// Print the artifact name, e.g. `engine-linux`.
    ///
    /// # Errors
    ///
    /// Fails on an unsupported operating system.
    pub fn execute(self) -> Result<()> {
        println!("{}", PlatformTarget::current()?.artifact_name());
        Ok(())
    }
}
