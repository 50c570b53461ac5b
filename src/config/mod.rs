//! Configuration management for binguard.
//!
//! Two layers are handled here:
//!
//! - [`GlobalConfig`] - the TOML file at `~/.binguard/config.toml` with the
//!   `[update]` and `[network]` sections
//! - [`NetworkConfig`] - the HTTP client policy (proxy, CA trust, timeouts)
//!   shared by every network call
//!
//! The `[update]` section is defined next to the code that consumes it in
//! [`crate::upgrade::config`].

mod global;
mod network;

pub use global::{GlobalConfig, config_dir};
pub use network::NetworkConfig;
