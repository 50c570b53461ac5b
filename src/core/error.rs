//! Error handling for binguard
//!
//! This module provides the error taxonomy of the update subsystem and the
//! user-facing rendering used by the CLI. The error system follows two rules:
//! 1. **Strongly-typed errors** so callers can pattern-match on the failure class
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`UpdateError`] - Enumerated failure cases of version discovery, download,
//!   verification and installation
//! - [`ErrorKind`] - Copyable classification tag derived from an [`UpdateError`],
//!   used by the recovery policy and carried in lifecycle events
//! - [`ErrorContext`] - Wrapper that adds details and suggestions for display
//!
//! # Expected outcomes are values
//!
//! A checksum mismatch or a cancelled download is an anticipated branch, not an
//! exceptional one. Installer and coordinator operations return
//! `Result<_, UpdateError>` and the recovery policy matches on
//! [`UpdateError::kind`] instead of inspecting error strings.
//!
//! # Examples
//!
//! ```rust,no_run
//! use binguard_cli::core::{ErrorKind, UpdateError};
//!
//! let err = UpdateError::ChecksumMismatch {
//!     expected: "abc".to_string(),
//!     actual: "def".to_string(),
//! };
//! assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
//! ```

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// The main error type for update operations
///
/// Variants carry owned strings rather than source errors so that an error can be
/// cloned into lifecycle events and failure notices without losing information.
///
/// # Error Categories
///
/// ## Transport
/// - [`Network`] - DNS, connect, TLS, timeout or a dropped stream
/// - [`HttpStatus`] - A well-formed response with a non-success status
///
/// ## Integrity and Installation
/// - [`ChecksumMismatch`] - Downloaded bytes do not hash to the published digest
/// - [`Filesystem`] - Permission denied, disk full, rename failures
///
/// ## Environment and Data
/// - [`MalformedVersion`] - A version string has a non-numeric component
/// - [`UnsupportedPlatform`] - No artifact is published for this OS
///
/// ## Control Flow
/// - [`Cancelled`] - User or process initiated abort, not a failure
///
/// [`Network`]: UpdateError::Network
/// [`HttpStatus`]: UpdateError::HttpStatus
/// [`ChecksumMismatch`]: UpdateError::ChecksumMismatch
/// [`Filesystem`]: UpdateError::Filesystem
/// [`MalformedVersion`]: UpdateError::MalformedVersion
/// [`UnsupportedPlatform`]: UpdateError::UnsupportedPlatform
/// [`Cancelled`]: UpdateError::Cancelled
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// Transport-level failure
    ///
    /// Raised for connection failures, timeouts and streams that end early.
    /// Treated as transient by the recovery policy.
    #[error("Network error during {operation}: {reason}")]
    Network {
        /// The network operation that failed (e.g., "artifact download")
        operation: String,
        /// Reason reported by the transport
        reason: String,
    },

    /// The server answered, but not with a success status
    #[error("Request to {url} was not successful (HTTP {status})")]
    HttpStatus {
        /// URL that was requested
        url: String,
        /// HTTP status code returned by the server
        status: u16,
    },

    /// Integrity check of a downloaded artifact failed
    ///
    /// The staging file is discarded and the installed binary is left untouched.
    #[error("Expected {expected}, but downloaded file has {actual}")]
    ChecksumMismatch {
        /// Digest published by the checksum endpoint
        expected: String,
        /// Digest computed over the downloaded bytes
        actual: String,
    },

    /// File system operation failed
    #[error("File system error during {operation} at {path}: {reason}")]
    Filesystem {
        /// The file system operation that failed
        operation: String,
        /// Path the operation was applied to
        path: String,
        /// Underlying I/O error message
        reason: String,
    },

    /// Version string could not be parsed as dotted integers
    #[error("Malformed version string: '{version}'")]
    MalformedVersion {
        /// The offending version string
        version: String,
    },

    /// No artifact exists for the running operating system
    #[error("{os} is not a supported platform")]
    UnsupportedPlatform {
        /// Operating system name as reported by the caller
        os: String,
    },

    /// The operation was cancelled before it completed
    #[error("Operation was cancelled")]
    Cancelled,

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem
        message: String,
    },

    /// Anything the taxonomy does not name
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

/// Classification tag for an [`UpdateError`]
///
/// `Config` and `Other` errors collapse into [`ErrorKind::Other`], which the
/// recovery policy treats as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport failure, including timeouts
    Network,
    /// Non-success HTTP status
    HttpStatus,
    /// Digest mismatch
    ChecksumMismatch,
    /// Local file system failure
    Filesystem,
    /// Unparseable version string
    MalformedVersion,
    /// Unknown operating system
    UnsupportedPlatform,
    /// Cancellation, not a failure
    Cancelled,
    /// Unclassified
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network error",
            Self::HttpStatus => "HTTP status error",
            Self::ChecksumMismatch => "checksum mismatch",
            Self::Filesystem => "file system error",
            Self::MalformedVersion => "malformed version",
            Self::UnsupportedPlatform => "unsupported platform",
            Self::Cancelled => "cancelled",
            Self::Other => "unexpected error",
        };
        f.write_str(name)
    }
}

impl UpdateError {
    /// Build a [`UpdateError::Network`] from any displayable reason
    pub fn network(operation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Network {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a [`UpdateError::Filesystem`] from an I/O error
    pub fn filesystem(operation: impl Into<String>, path: &Path, err: &std::io::Error) -> Self {
        Self::Filesystem {
            operation: operation.into(),
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    /// Build a [`UpdateError::Other`]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// The classification tag of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::HttpStatus { .. } => ErrorKind::HttpStatus,
            Self::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Self::Filesystem { .. } => ErrorKind::Filesystem,
            Self::MalformedVersion { .. } => ErrorKind::MalformedVersion,
            Self::UnsupportedPlatform { .. } => ErrorKind::UnsupportedPlatform,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config { .. } | Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Whether this error represents a cancellation
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::HttpStatus {
                url: err.url().map(ToString::to_string).unwrap_or_default(),
                status: status.as_u16(),
            };
        }

        let operation = if err.is_timeout() {
            "request (timed out)"
        } else if err.is_connect() {
            "connect"
        } else if err.is_body() || err.is_decode() {
            "response body"
        } else {
            "request"
        };
        Self::network(operation, err)
    }
}

/// Error with user-facing details and a suggestion
///
/// Displayed by the CLI with terminal colors:
/// - Error message: red and bold
/// - Details: yellow
/// - Suggestion: green
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdateError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context with no suggestion or details
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error context to stderr with terminal colors
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-friendly [`ErrorContext`]
///
/// Recognizes [`UpdateError`] (anywhere in the chain), [`std::io::Error`] and
/// [`toml::de::Error`]; everything else is wrapped as [`UpdateError::Other`].
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(update_error) = error.chain().find_map(|e| e.downcast_ref::<UpdateError>()) {
        return create_error_context(update_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>()
        && io_error.kind() == std::io::ErrorKind::PermissionDenied
    {
        return ErrorContext::new(UpdateError::Filesystem {
            operation: "file access".to_string(),
            path: "unknown".to_string(),
            reason: io_error.to_string(),
        })
        .with_suggestion("Check file ownership or choose a writable binary_path in the configuration")
        .with_details("binguard needs write access to the directory that holds the managed binary");
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(UpdateError::Config {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of your binguard config.toml");
    }

    ErrorContext::new(UpdateError::other(format!("{error:#}")))
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    match &error {
        UpdateError::Network { .. } => ErrorContext::new(error)
            .with_suggestion("Check your connection and proxy settings, then retry the update")
            .with_details("The download was interrupted before it completed; the installed binary was not modified"),
        UpdateError::HttpStatus { status, .. } => {
            let details = if *status >= 500 {
                "The distribution server reported an internal error"
            } else {
                "The distribution server rejected the request; check base_url and release_channel"
            };
            ErrorContext::new(error)
                .with_suggestion("Retry later, or contact support if the problem persists")
                .with_details(details)
        }
        UpdateError::ChecksumMismatch { .. } => ErrorContext::new(error)
            .with_suggestion("Retry the update; a corrupted download is usually transient")
            .with_details("The integrity check failed and the download was discarded"),
        UpdateError::Filesystem { .. } => ErrorContext::new(error)
            .with_suggestion("Make sure the binary directory is writable and has free space"),
        UpdateError::MalformedVersion { .. } => ErrorContext::new(error)
            .with_details("Versions must be dot-separated integers such as 1.345.1"),
        UpdateError::UnsupportedPlatform { .. } => ErrorContext::new(error)
            .with_details("Artifacts are published for Linux (glibc and musl), macOS and Windows"),
        UpdateError::Config { .. } => ErrorContext::new(error)
            .with_suggestion("Check the configuration file or the BINGUARD_CONFIG_PATH variable"),
        UpdateError::Cancelled | UpdateError::Other { .. } => ErrorContext::new(error),
    }
}
