//! Discovery of the latest published release.
//!
//! The version endpoint answers either with a bare version string or with a
//! small JSON document carrying a `tag_name` field. A leading `v` is stripped
//! before the version is compared or persisted.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::UpdateError;
use crate::upgrade::config::UpdateConfig;
use crate::upgrade::platform::PlatformTarget;
use crate::upgrade::verification::IntegrityManifest;

/// One installable release for this platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    /// Version without a leading `v`
    pub version: String,
    /// Download URL of the platform artifact
    pub artifact_url: String,
    /// URL of the artifact's `.sha256` file
    pub checksum_url: String,
}

impl ReleaseDescriptor {
    /// Describe `version` of `artifact_name` under `config`'s endpoints.
    pub fn new(config: &UpdateConfig, version: &str, artifact_name: &str) -> Self {
        let artifact_url = config.artifact_url(version, artifact_name);
        Self {
            version: version.trim_start_matches('v').to_string(),
            checksum_url: format!("{artifact_url}.sha256"),
            artifact_url,
        }
    }
}

/// Source of release metadata.
#[async_trait]
pub trait ReleaseOracle: Send + Sync {
    /// Latest release, or `None` on any transport failure.
    ///
    /// `None` means "try again later", never a fatal condition.
    async fn fetch_latest(&self) -> Option<ReleaseDescriptor>;

    /// Expected digest of `release`'s artifact.
    async fn fetch_manifest(
        &self,
        release: &ReleaseDescriptor,
    ) -> Result<IntegrityManifest, UpdateError>;
}

/// [`ReleaseOracle`] backed by the distribution server.
#[derive(Debug, Clone)]
pub struct HttpReleaseOracle {
    client: reqwest::Client,
    config: UpdateConfig,
    platform: PlatformTarget,
}

#[derive(Deserialize)]
struct TaggedRelease {
    tag_name: String,
}

impl HttpReleaseOracle {
    /// Create an oracle using `client` for every request.
    pub fn new(client: reqwest::Client, config: UpdateConfig, platform: PlatformTarget) -> Self {
        Self {
            client,
            config,
            platform,
        }
    }

    async fn fetch_version(&self) -> Result<Option<String>, UpdateError> {
        let url = self.config.version_url();
        debug!("Fetching latest version from {}", url);

        let body = self.client.get(&url).send().await?.error_for_status()?.text().await?;
        Ok(parse_version_body(&body))
    }
}

#[async_trait]
impl ReleaseOracle for HttpReleaseOracle {
    async fn fetch_latest(&self) -> Option<ReleaseDescriptor> {
        match self.fetch_version().await {
            Ok(Some(version)) => {
                Some(ReleaseDescriptor::new(&self.config, &version, &self.platform.artifact_name()))
            }
            Ok(None) => {
                warn!("Version endpoint returned no version");
                None
            }
            Err(e) => {
                warn!("Failed to fetch latest release info: {}", e);
                None
            }
        }
    }

    async fn fetch_manifest(
        &self,
        release: &ReleaseDescriptor,
    ) -> Result<IntegrityManifest, UpdateError> {
        debug!("Fetching checksum from {}", release.checksum_url);
        let body = self
            .client
            .get(&release.checksum_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        IntegrityManifest::parse(&body)
    }
}

/// Extract a version from a version endpoint body.
///
/// Accepts `1.2.3`, `v1.2.3` and `{"tag_name": "v1.2.3"}`. Returns `None` for
/// an empty body or JSON without a usable `tag_name`.
pub fn parse_version_body(body: &str) -> Option<String> {
    let body = body.trim();
    let raw = if body.starts_with('{') {
        serde_json::from_str::<TaggedRelease>(body).ok()?.tag_name
    } else {
        body.lines().next().unwrap_or_default().to_string()
    };

    let version = raw.trim().trim_start_matches('v').trim();
    (!version.is_empty()).then(|| version.to_string())
}
