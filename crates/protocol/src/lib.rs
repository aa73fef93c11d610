//! Wire and data types for stashbox.
//!
//! Everything that crosses the boundary between the upload core, the UI
//! layer and the remote store lives here so that every crate agrees on
//! one JSON shape (camelCase, matching the web API).

pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use messages::{
    AbortMultipartRequest, CompleteMultipartRequest, CompletedPart, CreateFolderRequest,
    InitMultipartRequest, InitMultipartResponse, MoveFileRequest, UploadPartResponse,
};
pub use types::{CallerIdentity, CallerKind, QueueEntry, RemoteFileRecord, UploadState};
