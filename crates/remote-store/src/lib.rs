//! Remote store client for stashbox.
//!
//! The upload core only sees the [`RemoteStore`] trait. [`HttpRemoteStore`]
//! implements it over the web API with `reqwest`; tests and embedders can
//! supply their own implementation.

pub mod client;
pub mod config;
pub mod credentials;
pub mod store;

pub use client::HttpRemoteStore;
pub use config::RemoteStoreConfig;
pub use credentials::{CredentialProvider, StaticCredentials};
pub use store::{ByteProgress, PartUpload, RemoteStore, StoreFuture, WholeFileUpload};

/// Errors from the remote store.
#[derive(Debug, thiserror::Error)]
pub enum RemoteStoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl RemoteStoreError {
    /// HTTP status for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteStoreError::Api { status, .. } => Some(*status),
            RemoteStoreError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the request never got a response (connectivity loss,
    /// DNS failure, timeout) as opposed to the server rejecting it.
    pub fn is_connectivity(&self) -> bool {
        match self {
            RemoteStoreError::Http(e) => e.status().is_none() && !e.is_decode(),
            RemoteStoreError::Connection(_) => true,
            _ => false,
        }
    }
}
