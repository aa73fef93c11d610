use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Pending,
    Uploading,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl UploadState {
    /// Returns `true` for states counted as "active" in the upload queue.
    pub fn is_active(self) -> bool {
        matches!(self, UploadState::Pending | UploadState::Uploading)
    }

    /// Completed is the only state no command can leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Completed)
    }
}

/// Whether the caller is a registered user or an anonymous guest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerKind {
    #[default]
    Guest,
    Registered,
}

impl CallerKind {
    /// Value sent in the `x-user-type` header.
    pub fn as_header_value(self) -> &'static str {
        match self {
            CallerKind::Guest => "guest",
            CallerKind::Registered => "registered",
        }
    }
}

/// Opaque identity attached to every remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub user_id: String,
    pub kind: CallerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl CallerIdentity {
    pub fn guest(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            kind: CallerKind::Guest,
            token: None,
        }
    }

    pub fn registered(user_id: impl Into<String>, token: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            kind: CallerKind::Registered,
            token,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.kind == CallerKind::Guest
    }
}

/// Persisted metadata row for a completed upload.
///
/// `key` is unique and permanently bound to one blob object (or to zero
/// bytes when the record is a folder marker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileRecord {
    pub id: String,
    pub key: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// Creation time in Unix milliseconds.
    pub created_at: i64,
    pub url: String,
    /// Virtual folder path; empty for the root.
    #[serde(default)]
    pub folder: String,
    pub owner_id: String,
}

impl RemoteFileRecord {
    /// Creation time as a UTC timestamp.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at).single()
    }

    /// Folder markers are zero-byte records whose key ends with `/`.
    pub fn is_folder_marker(&self) -> bool {
        self.size == 0 && self.key.ends_with('/')
    }
}

/// One row of the upload queue, mirrored from its session for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub session_id: String,
    pub display_name: String,
    pub progress_percent: f64,
    pub state: UploadState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
