//! Long-running consumers of the managed binary.
//!
//! A process that keeps the binary open (a language server, a daemon) has to
//! release it before the file is replaced and is started again afterwards.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::UpdateError;

/// A process that holds the managed binary open.
#[async_trait]
pub trait DependentProcess: Send + Sync {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Release the binary (stop or drain).
    async fn stop(&self) -> Result<(), UpdateError>;

    /// Start again after the binary changed.
    async fn restart(&self) -> Result<(), UpdateError>;
}

/// Stop every dependent, each bounded by `timeout`.
///
/// Failures and timeouts are logged and never abort the install.
pub(crate) async fn stop_all(dependents: &[Arc<dyn DependentProcess>], timeout: Duration) {
    for dependent in dependents {
        match tokio::time::timeout(timeout, dependent.stop()).await {
            Ok(Ok(())) => debug!("Stopped {}", dependent.name()),
            Ok(Err(e)) => warn!("Failed to stop {} before install: {}", dependent.name(), e),
            Err(_) => warn!(
                "{} did not stop within {}s, installing anyway",
                dependent.name(),
                timeout.as_secs_f32()
            ),
        }
    }
}

/// Restart every dependent, logging failures.
pub(crate) async fn restart_all(dependents: &[Arc<dyn DependentProcess>]) {
    for dependent in dependents {
        if let Err(e) = dependent.restart().await {
            warn!("Failed to restart {}: {}", dependent.name(), e);
        } else {
            debug!("Restarted {}", dependent.name());
        }
    }
}
