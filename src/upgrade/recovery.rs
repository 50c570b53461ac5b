//! Failure classification and recovery.
//!
//! | Kind                | Automatic retry | Surfaced actions           |
//! |---------------------|-----------------|----------------------------|
//! | `Network`           | once            | retry download, support    |
//! | `ChecksumMismatch`  | once            | retry download, support    |
//! | `HttpStatus`        | no              | support                    |
//! | `Cancelled`         | no              | nothing, not an error      |
//! | anything else       | no              | support                    |

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::{error, warn};

use crate::constants::{AUTOMATIC_RETRIES, SUPPORT_URL};
use crate::core::{ErrorKind, UpdateError};

/// How a failure is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Failure class
    pub kind: ErrorKind,
    /// Whether one automatic retry is attempted
    pub retryable: bool,
}

/// Classify `error` for the recovery policy.
pub const fn classify(error: &UpdateError) -> Classification {
    let kind = error.kind();
    let retryable = matches!(kind, ErrorKind::Network | ErrorKind::ChecksumMismatch);
    Classification { kind, retryable }
}

/// Action offered to the user alongside a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAction {
    /// Start another download
    RetryDownload,
    /// Open the support page
    ContactSupport,
}

impl fmt::Display for PromptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryDownload => f.write_str("Retry download"),
            Self::ContactSupport => write!(f, "Contact support ({SUPPORT_URL})"),
        }
    }
}

/// Where in the update a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// The release endpoint could not be read
    ReleaseInfo,
    /// Download, verification or installation
    Install,
}

/// A user-actionable failure report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    /// Failure class
    pub kind: ErrorKind,
    /// Message for the user
    pub message: String,
    /// Offered actions
    pub actions: Vec<PromptAction>,
}

impl FailureNotice {
    /// Build the notice for `error`; `None` for cancellation.
    pub fn for_error(error: &UpdateError, stage: FailureStage) -> Option<Self> {
        let kind = error.kind();
        let (message, actions) = match (stage, error) {
            (_, UpdateError::Cancelled) => return None,
            (FailureStage::ReleaseInfo, _) => (
                "Failed to fetch the latest release info. Please retry in a few minutes or \
                 contact support if the issue persists."
                    .to_string(),
                vec![PromptAction::RetryDownload, PromptAction::ContactSupport],
            ),
            (FailureStage::Install, UpdateError::Network { reason, .. }) => (
                format!(
                    "The download of the binary was interrupted by an error ({reason}). \
                     Do you want to try again?"
                ),
                vec![PromptAction::RetryDownload, PromptAction::ContactSupport],
            ),
            (FailureStage::Install, UpdateError::ChecksumMismatch { .. }) => (
                format!(
                    "The download of the binary was not successful. The integrity check failed ({error})."
                ),
                vec![PromptAction::RetryDownload, PromptAction::ContactSupport],
            ),
            (FailureStage::Install, UpdateError::HttpStatus { status, .. }) => (
                format!("The download request of the current binary was not successful (HTTP {status})."),
                vec![PromptAction::ContactSupport],
            ),
            (FailureStage::Install, other) => (
                format!("The update of the binary failed: {other}"),
                vec![PromptAction::ContactSupport],
            ),
        };

        Some(Self {
            kind,
            message,
            actions,
        })
    }
}

/// Surfaces failure notices to the user.
pub trait Notifier: Send + Sync {
    /// Show `notice`.
    fn notify(&self, notice: &FailureNotice);
}

/// [`Notifier`] that writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: &FailureNotice) {
        error!(kind = %notice.kind, actions = ?notice.actions, "{}", notice.message);
    }
}

/// Retry and notification policy for failed updates.
#[derive(Clone)]
pub struct RecoveryPolicy {
    retry_delay: Duration,
    notifier: Arc<dyn Notifier>,
}

impl fmt::Debug for RecoveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryPolicy").field("retry_delay", &self.retry_delay).finish_non_exhaustive()
    }
}

impl RecoveryPolicy {
    /// Create a policy waiting `retry_delay` before the automatic retry.
    pub fn new(retry_delay: Duration, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            retry_delay,
            notifier,
        }
    }

    /// Run `attempt`, retrying once after a retryable failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub async fn run<T, F, Fut>(&self, attempt: F) -> Result<T, UpdateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpdateError>>,
    {
        let strategy = FixedInterval::new(self.retry_delay).take(AUTOMATIC_RETRIES);
        RetryIf::spawn(strategy, attempt, |e: &UpdateError| {
            let classification = classify(e);
            if classification.retryable {
                warn!("Install failed ({}), retrying once: {}", classification.kind, e);
            }
            classification.retryable
        })
        .await
    }

    /// Surface a terminal failure; cancellation stays silent.
    pub fn on_failure(&self, error: &UpdateError, stage: FailureStage) -> Option<FailureNotice> {
        let notice = FailureNotice::for_error(error, stage)?;
        self.notifier.notify(&notice);
        Some(notice)
    }
}
