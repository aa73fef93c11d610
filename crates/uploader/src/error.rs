//! Upload error types.

use std::time::Duration;

use stashbox_remote_store::RemoteStoreError;
use stashbox_transfer::TransferError;

/// Why a single part request did not produce an ETag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server rejected part ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request aborted")]
    Aborted,

    #[error("request timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<RemoteStoreError> for TransportError {
    fn from(err: RemoteStoreError) -> Self {
        if err.is_connectivity() {
            return TransportError::Network(err.to_string());
        }
        match err {
            RemoteStoreError::Api { status, message } => TransportError::Server { status, message },
            other => match other.status() {
                Some(status) => TransportError::Server {
                    status,
                    message: other.to_string(),
                },
                None => TransportError::InvalidResponse(other.to_string()),
            },
        }
    }
}

/// Errors surfaced by upload sessions and the orchestrator.
///
/// The `Display` text is what ends up in a session's `last_error`.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("could not start upload: {0}")]
    Init(String),

    #[error("part {part_number} failed: {source}")]
    ChunkTransport {
        part_number: u32,
        source: TransportError,
    },

    #[error("upload failed: {0}")]
    WholeFile(#[source] TransportError),

    #[error("could not finalise upload: {0}")]
    Completion(String),

    #[error("file limit reached ({limit} files)")]
    LimitExceeded { limit: usize },

    #[error("invalid folder: {0}")]
    InvalidFolder(String),

    #[error("could not read file: {0}")]
    Read(#[from] TransferError),

    #[error("remote store error: {0}")]
    Remote(#[from] RemoteStoreError),
}

impl UploadError {
    /// Converts a transfer error from folder validation.
    pub(crate) fn from_folder(err: TransferError) -> Self {
        match err {
            TransferError::InvalidPath(path) => UploadError::InvalidFolder(path),
            other => UploadError::Read(other),
        }
    }
}

/// Errors loading [`UploaderConfig`](crate::UploaderConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
