//! Single-part transport with abort and timeout.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use stashbox_protocol::{CompletedPart, UploadPartResponse};
use stashbox_remote_store::{PartUpload, RemoteStore, RemoteStoreError};
use stashbox_transfer::Chunk;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::TransportError;

/// Sends one chunk of a multipart upload at a time.
///
/// At most one request is tracked as in flight; [`abort_in_flight`]
/// tears it down and makes the pending [`send_chunk`] resolve to
/// [`TransportError::Aborted`].
///
/// [`abort_in_flight`]: ChunkTransport::abort_in_flight
/// [`send_chunk`]: ChunkTransport::send_chunk
pub struct ChunkTransport {
    store: Arc<dyn RemoteStore>,
    timeout: Option<Duration>,
    in_flight: Mutex<InFlight>,
}

#[derive(Default)]
struct InFlight {
    next_id: u64,
    current: Option<(u64, CancellationToken)>,
}

impl ChunkTransport {
    pub fn new(store: Arc<dyn RemoteStore>, timeout: Option<Duration>) -> Self {
        Self {
            store,
            timeout,
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    /// Uploads `chunk` as part `chunk.part_number()` of `upload_id`.
    ///
    /// Resolves to the part's ETag, or fails with a network, server,
    /// timeout or abort error. Never retries on its own.
    pub async fn send_chunk(
        &self,
        chunk: Chunk,
        upload_id: &str,
        remote_key: &str,
    ) -> Result<CompletedPart, TransportError> {
        let part_number = chunk.part_number();
        let bytes = chunk.len();
        let (request_id, token) = self.arm();

        let part = PartUpload {
            upload_id: upload_id.to_string(),
            key: remote_key.to_string(),
            part_number,
            data: chunk.data,
            checksum: chunk.checksum,
        };
        trace!(upload_id, part = part_number, bytes, "part request started");

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransportError::Aborted),
            r = with_timeout(self.timeout, self.store.upload_part(part)) => r,
        };
        self.disarm(request_id);

        match &result {
            Ok(_) => debug!(upload_id, part = part_number, bytes, "part acknowledged"),
            Err(TransportError::Aborted) => debug!(upload_id, part = part_number, "part aborted"),
            Err(e) => debug!(upload_id, part = part_number, error = %e, "part failed"),
        }
        result.map(|resp| CompletedPart {
            part_number,
            etag: resp.etag,
        })
    }

    /// Aborts the request currently in flight, if any.
    pub fn abort_in_flight(&self) {
        if let Some((request_id, token)) = self.lock().current.take() {
            debug!(request_id, "aborting in-flight part");
            token.cancel();
        }
    }

    /// Whether a part request is currently outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.lock().current.is_some()
    }

    fn arm(&self) -> (u64, CancellationToken) {
        let mut slot = self.lock();
        slot.next_id += 1;
        let token = CancellationToken::new();
        slot.current = Some((slot.next_id, token.clone()));
        (slot.next_id, token)
    }

    // Only clears the slot if a newer request has not replaced it.
    fn disarm(&self, request_id: u64) {
        let mut slot = self.lock();
        if matches!(slot.current, Some((id, _)) if id == request_id) {
            slot.current = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn with_timeout<F>(
    timeout: Option<Duration>,
    request: F,
) -> Result<UploadPartResponse, TransportError>
where
    F: Future<Output = Result<UploadPartResponse, RemoteStoreError>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, request).await {
            Ok(result) => result.map_err(TransportError::from),
            Err(_) => Err(TransportError::TimedOut(limit)),
        },
        None => request.await.map_err(TransportError::from),
    }
}
