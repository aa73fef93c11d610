//! Session command surface and UI notifications.

use std::sync::Arc;
use std::time::Duration;

use stashbox_protocol::{RemoteFileRecord, UploadState};

/// Commands and state shared by every kind of upload session.
///
/// Commands never block and never fail: a command that is invalid in the
/// current state is ignored. The outcome is reported through
/// [`SessionCallbacks`]. The first `start` must be called from within a
/// Tokio runtime; the session keeps that runtime's handle and later
/// commands may come from any thread.
pub trait UploadControl: Send + Sync {
    fn id(&self) -> &str;

    /// Begins the transfer. From `Cancelled` this starts over from scratch.
    fn start(&self);

    fn pause(&self);

    /// Continues a paused or failed transfer without re-sending
    /// acknowledged data.
    fn resume(&self);

    /// Stops the transfer and discards its remote progress.
    fn cancel(&self);

    fn snapshot(&self) -> SessionSnapshot;

    fn state(&self) -> UploadState {
        self.snapshot().state
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub display_name: String,
    pub state: UploadState,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    pub last_error: Option<String>,
    pub record: Option<RemoteFileRecord>,
}

impl SessionSnapshot {
    /// Percent complete in `0.0..=100.0`.
    pub fn percent(&self) -> f64 {
        percent(self.state, self.uploaded_bytes, self.total_bytes)
    }
}

pub(crate) fn percent(state: UploadState, uploaded: u64, total: u64) -> f64 {
    if total == 0 {
        return if state == UploadState::Completed { 100.0 } else { 0.0 };
    }
    (uploaded.min(total) as f64 / total as f64) * 100.0
}

/// Emitted on every state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub session_id: String,
    pub state: UploadState,
    /// Human-readable reason when `state` is `Failed`.
    pub error: Option<String>,
    /// The stored file when `state` is `Completed`.
    pub record: Option<RemoteFileRecord>,
}

/// Emitted as acknowledged bytes grow.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub session_id: String,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    pub percent: f64,
    pub bytes_per_second: f64,
    /// Time left at the current rate, once a rate is known.
    pub eta: Option<Duration>,
}

pub type StatusCallback = Arc<dyn Fn(StatusEvent) + Send + Sync>;
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// UI hooks for one session. Callbacks run on the task that produced the
/// event and are never invoked while session state is locked.
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    on_status: Option<StatusCallback>,
    on_progress: Option<ProgressCallback>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_status(mut self, f: impl Fn(StatusEvent) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Arc::new(f));
        self
    }

    pub fn on_progress(mut self, f: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub(crate) fn status(&self, event: StatusEvent) {
        if let Some(cb) = &self.on_status {
            cb(event);
        }
    }

    pub(crate) fn progress(&self, event: ProgressEvent) {
        if let Some(cb) = &self.on_progress {
            cb(event);
        }
    }
}

impl std::fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("on_status", &self.on_status.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}
