//! Resumable upload engine for stashbox.
//!
//! This crate holds the upload **business logic**: it knows nothing about
//! HTTP or UI. It drives a [`RemoteStore`](stashbox_remote_store::RemoteStore)
//! and reports to the UI through [`SessionCallbacks`].
//!
//! # Flow
//!
//! 1. **Enqueue**: [`UploadOrchestrator`] validates the target folder and
//!    the guest quota, then picks a path by size
//! 2. **Small files**: [`SmallUploadSession`] sends the file in one request
//! 3. **Large files**: [`UploadSession`] opens a multipart upload, sends
//!    chunks in order through a [`ChunkTransport`] and completes it
//! 4. **Control**: pause, resume, cancel and restart per session, with
//!    acknowledged parts surviving pause and failure

pub mod config;
pub mod control;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod small;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::UploaderConfig;
pub use control::{
    ProgressCallback, ProgressEvent, SessionCallbacks, SessionSnapshot, StatusCallback,
    StatusEvent, UploadControl,
};
pub use error::{ConfigError, TransportError, UploadError};
pub use orchestrator::{QueueEvent, UploadOrchestrator};
pub use session::{SessionSetup, UploadSession};
pub use small::SmallUploadSession;
pub use transport::ChunkTransport;
