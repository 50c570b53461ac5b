//! Cross-cutting helpers for the command-line surface.
//!
//! - [`progress`] - Download progress rendering driven by lifecycle events

pub mod progress;

pub use progress::DownloadProgress;
