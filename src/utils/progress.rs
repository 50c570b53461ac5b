//! Terminal progress for downloads.
//!
//! A thin wrapper over `indicatif` that starts as a spinner while the release
//! endpoint is queried and becomes a byte-counting bar once the server
//! announces a content length. When progress is disabled the bar is hidden
//! and every call is a no-op, so callers never branch on it.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};
use std::time::Duration;

use crate::upgrade::{DownloadEvent, DownloadState};

const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg}";
const DOWNLOAD_TEMPLATE: &str =
    "{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Progress display for one update session.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    inner: IndicatifBar,
}

impl DownloadProgress {
    /// Create a spinner, or a hidden bar when `enabled` is false.
    pub fn new(enabled: bool) -> Self {
        let inner = if enabled {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            IndicatifBar::hidden()
        };
        Self { inner }
    }

    /// Whether output is suppressed.
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }

    /// Apply one lifecycle event.
    pub fn apply(&self, event: &DownloadEvent) {
        match event {
            DownloadEvent::Started { .. } => self.inner.set_message("Starting update"),
            DownloadEvent::StateChanged { state, .. } => self.set_state(*state),
            DownloadEvent::Progress {
                downloaded, total, ..
            } => {
                if let Some(total) = total
                    && self.inner.length() != Some(*total)
                {
                    self.inner.set_style(download_style());
                    self.inner.set_length(*total);
                }
                self.inner.set_position(*downloaded);
            }
            DownloadEvent::Finished(_) => {}
        }
    }

    fn set_state(&self, state: DownloadState) {
        let message = match state {
            DownloadState::CheckingVersion => "Checking for a new release",
            DownloadState::Downloading => "Downloading",
            DownloadState::Verifying => "Verifying checksum",
            DownloadState::Installing => "Installing",
            DownloadState::Cancelled => "Cancelling",
            DownloadState::Idle => return,
        };
        if matches!(state, DownloadState::Verifying | DownloadState::Installing) {
            self.inner.set_style(spinner_style());
        }
        self.inner.set_message(message);
    }

    /// Run `f` with the bar temporarily cleared from the terminal.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.inner.suspend(f)
    }

    /// Remove the bar.
    pub fn finish(&self) {
        self.inner.finish_and_clear();
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}

fn download_style() -> ProgressStyle {
    ProgressStyle::with_template(DOWNLOAD_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}
