//! The remote store capability consumed by the upload core.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use stashbox_protocol::{
    AbortMultipartRequest, CompleteMultipartRequest, InitMultipartRequest, InitMultipartResponse,
    RemoteFileRecord, UploadPartResponse,
};

use crate::RemoteStoreError;

/// Boxed future returned by every [`RemoteStore`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteStoreError>> + Send + 'a>>;

/// Callback receiving the cumulative number of body bytes sent.
pub type ByteProgress = Arc<dyn Fn(u64) + Send + Sync>;

/// One part of a multipart upload.
#[derive(Debug, Clone)]
pub struct PartUpload {
    pub upload_id: String,
    pub key: String,
    /// 1-based part number.
    pub part_number: u32,
    pub data: Vec<u8>,
    /// SHA-256 hex digest of `data`.
    pub checksum: String,
}

/// A whole file sent in a single request.
#[derive(Debug, Clone)]
pub struct WholeFileUpload {
    pub file_name: String,
    pub folder: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Abstract remote store.
///
/// [`HttpRemoteStore`](crate::HttpRemoteStore) implements this over HTTP.
/// Keeping it a trait lets the upload state machine be tested with mocks.
pub trait RemoteStore: Send + Sync {
    /// Opens a multipart upload and returns its `uploadId` and object key.
    fn init_multipart(&self, req: InitMultipartRequest)
    -> StoreFuture<'_, InitMultipartResponse>;

    /// Uploads one part. Dropping the future tears down the request.
    fn upload_part(&self, part: PartUpload) -> StoreFuture<'_, UploadPartResponse>;

    /// Assembles the parts and registers the file record.
    fn complete_multipart(&self, req: CompleteMultipartRequest)
    -> StoreFuture<'_, RemoteFileRecord>;

    /// Discards a multipart upload.
    fn abort_multipart(&self, req: AbortMultipartRequest) -> StoreFuture<'_, ()>;

    /// Uploads a small file in one request.
    fn upload_whole(
        &self,
        upload: WholeFileUpload,
        progress: Option<ByteProgress>,
    ) -> StoreFuture<'_, RemoteFileRecord>;

    /// Lists file records, optionally restricted to one folder.
    fn list_files(&self, folder: Option<String>) -> StoreFuture<'_, Vec<RemoteFileRecord>>;

    /// Deletes a file record and its blob.
    fn delete_file(&self, id: String) -> StoreFuture<'_, ()>;

    /// Moves a file record to another virtual folder.
    fn move_file(&self, id: String, folder: String) -> StoreFuture<'_, RemoteFileRecord>;

    /// Creates a zero-byte folder marker.
    fn create_folder(&self, path: String) -> StoreFuture<'_, RemoteFileRecord>;
}
