//! HTTP client policy shared by every network collaborator.
//!
//! The release oracle and the installer both receive the client built here,
//! so proxy, CA trust and timeouts are applied uniformly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::constants::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::core::UpdateError;

/// `[network]` section of the global configuration.
///
/// ```toml
/// [network]
/// proxy = "http://proxy.corp.example:3128"
/// ca_certificate = "/etc/ssl/corp-root.pem"
/// connect_timeout_secs = 30
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// `User-Agent` header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds; unset means none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Proxy URL applied to all schemes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Extra PEM root certificate to trust.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<PathBuf>,

    /// Disable TLS certificate validation.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: None,
            proxy: None,
            ca_certificate: None,
            accept_invalid_certs: false,
        }
    }
}

fn default_user_agent() -> String {
    format!("binguard/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl NetworkConfig {
    /// Build the HTTP client for this policy.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Config`] if the proxy URL is invalid, the CA
    /// certificate cannot be read or parsed, or the TLS backend fails to
    /// initialise.
    pub fn build_client(&self) -> Result<reqwest::Client, UpdateError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs));

        if let Some(secs) = self.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| UpdateError::Config {
                message: format!("Invalid proxy URL '{proxy}': {e}"),
            })?;
            builder = builder.proxy(proxy);
        }

        if let Some(ca_path) = &self.ca_certificate {
            let pem = std::fs::read(ca_path).map_err(|e| UpdateError::Config {
                message: format!("Failed to read CA certificate {}: {e}", ca_path.display()),
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| UpdateError::Config {
                message: format!("Failed to parse CA certificate {}: {e}", ca_path.display()),
            })?;
            builder = builder.add_root_certificate(cert);
            debug!("Trusting additional CA certificate {}", ca_path.display());
        }

        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().map_err(|e| UpdateError::Config {
            message: format!("Failed to build HTTP client: {e}"),
        })
    }
}
