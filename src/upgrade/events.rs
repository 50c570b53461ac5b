//! Lifecycle events published by the download coordinator.
//!
//! Hosts subscribe through [`DownloadCoordinator::subscribe`](super::DownloadCoordinator::subscribe)
//! instead of waiting on `request_update`. Every session that emits
//! [`DownloadEvent::Started`] emits exactly one [`DownloadEvent::Finished`].

use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::core::ErrorKind;

/// Phase of the coordinator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// No session
    Idle,
    /// Querying the release endpoint
    CheckingVersion,
    /// Streaming the artifact into the staging file
    Downloading,
    /// Hashing the staging file
    Verifying,
    /// Swapping the staging file into place
    Installing,
    /// Session aborted by a cancel request
    Cancelled,
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::CheckingVersion => "checking version",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Installing => "installing",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Outcome carried by [`DownloadEvent::Finished`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadFinished {
    /// Session the outcome belongs to
    pub session_id: Uuid,
    /// Whether the binary is now current
    pub success: bool,
    /// Installed version after a successful session
    pub installed_version: Option<String>,
    /// Classified failure, `None` on success
    pub error: Option<ErrorKind>,
}

/// Event emitted while a session runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// A session was created
    Started {
        /// New session id
        session_id: Uuid,
    },
    /// The state machine moved
    StateChanged {
        /// Session id
        session_id: Uuid,
        /// New state
        state: DownloadState,
    },
    /// Bytes were written to the staging file
    Progress {
        /// Session id
        session_id: Uuid,
        /// Bytes written so far
        downloaded: u64,
        /// Content length if the server sent one
        total: Option<u64>,
    },
    /// The session ended
    Finished(DownloadFinished),
}

/// Broadcast fan-out of [`DownloadEvent`]s.
///
/// Sending never blocks and never fails when nobody is subscribed.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DownloadEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default capacity.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish `event` to current subscribers.
    pub fn emit(&self, event: DownloadEvent) {
        // Err only means there are no receivers.
        let _ = self.sender.send(event);
    }

    /// Receive events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.sender.subscribe()
    }
}

/// Emits events on behalf of one session.
#[derive(Debug, Clone)]
pub struct SessionReporter {
    bus: EventBus,
    session_id: Uuid,
}

impl SessionReporter {
    /// Report for `session_id` on `bus`.
    pub const fn new(bus: EventBus, session_id: Uuid) -> Self {
        Self { bus, session_id }
    }

    /// Session this reporter belongs to.
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Announce a state transition.
    pub fn state(&self, state: DownloadState) {
        self.bus.emit(DownloadEvent::StateChanged {
            session_id: self.session_id,
            state,
        });
    }

    /// Announce download progress.
    pub fn progress(&self, downloaded: u64, total: Option<u64>) {
        self.bus.emit(DownloadEvent::Progress {
            session_id: self.session_id,
            downloaded,
            total,
        });
    }
}
