//! Single-request upload for files that fit in one chunk.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stashbox_protocol::{RemoteFileRecord, UploadState};
use stashbox_remote_store::{ByteProgress, RemoteStore, WholeFileUpload};
use stashbox_transfer::UploadSource;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::control::{
    ProgressEvent, SessionCallbacks, SessionSnapshot, StatusEvent, UploadControl, percent,
};
use crate::error::{TransportError, UploadError};
use crate::session::SessionSetup;

/// Uploads a small file in one request.
///
/// There is nothing to resume, so `pause` behaves like `cancel` and
/// `resume` starts a fresh attempt. The session stays `Pending` while the
/// request is in flight.
pub struct SmallUploadSession {
    shared: Arc<Shared>,
}

struct Shared {
    id: String,
    source: Arc<dyn UploadSource>,
    folder: String,
    store: Arc<dyn RemoteStore>,
    limiter: Option<Arc<Semaphore>>,
    callbacks: SessionCallbacks,
    inner: Mutex<Inner>,
}

struct Inner {
    state: UploadState,
    /// Incremented per start; stale attempts are ignored.
    attempt: u64,
    in_flight: bool,
    token: CancellationToken,
    uploaded_bytes: u64,
    last_error: Option<String>,
    record: Option<RemoteFileRecord>,
    runtime: Option<Handle>,
}

impl SmallUploadSession {
    pub fn new(
        setup: SessionSetup,
        store: Arc<dyn RemoteStore>,
        callbacks: SessionCallbacks,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: setup.id,
                source: setup.source,
                folder: setup.folder,
                store,
                limiter: setup.limiter,
                callbacks,
                inner: Mutex::new(Inner {
                    state: UploadState::Pending,
                    attempt: 0,
                    in_flight: false,
                    token: CancellationToken::new(),
                    uploaded_bytes: 0,
                    last_error: None,
                    record: None,
                    runtime: None,
                }),
            }),
        }
    }
}

impl UploadControl for SmallUploadSession {
    fn id(&self) -> &str {
        &self.shared.id
    }

    fn start(&self) {
        let mut inner = self.shared.lock();
        let restartable = match inner.state {
            UploadState::Pending => !inner.in_flight,
            UploadState::Failed | UploadState::Cancelled => true,
            _ => false,
        };
        if !restartable {
            return;
        }
        let runtime = inner.runtime.get_or_insert_with(Handle::current).clone();
        let was_pending = inner.state == UploadState::Pending;
        inner.state = UploadState::Pending;
        inner.in_flight = true;
        inner.attempt += 1;
        inner.token = CancellationToken::new();
        inner.uploaded_bytes = 0;
        inner.last_error = None;
        let attempt = inner.attempt;
        let token = inner.token.clone();
        let status = self.shared.status_event(&inner);
        drop(inner);

        info!(session = %self.shared.id, attempt, "single-request upload started");
        if !was_pending {
            self.shared.callbacks.status(status);
        }
        let shared = Arc::clone(&self.shared);
        runtime.spawn(async move { shared.run(attempt, token).await });
    }

    fn pause(&self) {
        self.cancel();
    }

    fn resume(&self) {
        self.start();
    }

    fn cancel(&self) {
        let mut inner = self.shared.lock();
        if matches!(inner.state, UploadState::Completed | UploadState::Cancelled) {
            return;
        }
        inner.state = UploadState::Cancelled;
        inner.in_flight = false;
        inner.token.cancel();
        inner.uploaded_bytes = 0;
        inner.last_error = None;
        let status = self.shared.status_event(&inner);
        drop(inner);

        info!(session = %self.shared.id, "single-request upload cancelled");
        self.shared.callbacks.status(status);
    }

    fn snapshot(&self) -> SessionSnapshot {
        let inner = self.shared.lock();
        SessionSnapshot {
            session_id: self.shared.id.clone(),
            display_name: self.shared.source.name().to_string(),
            state: inner.state,
            uploaded_bytes: inner.uploaded_bytes,
            total_bytes: self.shared.source.size(),
            last_error: inner.last_error.clone(),
            record: inner.record.clone(),
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status_event(&self, inner: &Inner) -> StatusEvent {
        StatusEvent {
            session_id: self.id.clone(),
            state: inner.state,
            error: inner.last_error.clone(),
            record: inner.record.clone(),
        }
    }

    fn progress_event(&self, inner: &Inner) -> ProgressEvent {
        let total = self.source.size();
        ProgressEvent {
            session_id: self.id.clone(),
            uploaded_bytes: inner.uploaded_bytes,
            total_bytes: total,
            percent: percent(inner.state, inner.uploaded_bytes, total),
            bytes_per_second: 0.0,
            eta: None,
        }
    }

    fn is_current(&self, inner: &Inner, attempt: u64) -> bool {
        inner.attempt == attempt && inner.in_flight && inner.state == UploadState::Pending
    }

    async fn run(self: Arc<Self>, attempt: u64, token: CancellationToken) {
        let _permit = match &self.limiter {
            Some(limiter) => tokio::select! {
                biased;
                _ = token.cancelled() => return,
                permit = Arc::clone(limiter).acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
            },
            None => None,
        };

        let size = self.source.size();
        let data = match self.source.read_range(0, size as usize).await {
            Ok(data) => data,
            Err(e) => {
                self.fail(attempt, UploadError::Read(e));
                return;
            }
        };
        let upload = WholeFileUpload {
            file_name: self.source.name().to_string(),
            folder: self.folder.clone(),
            content_type: self.source.mime_type().to_string(),
            data,
        };
        let reporter = Arc::clone(&self);
        let progress: ByteProgress = Arc::new(move |sent: u64| reporter.report(attempt, sent));

        debug!(session = %self.id, bytes = size, "sending file");
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            r = self.store.upload_whole(upload, Some(progress)) => r,
        };
        match result {
            Ok(record) => self.finish(attempt, record),
            Err(e) => self.fail(attempt, UploadError::WholeFile(TransportError::from(e))),
        }
    }

    fn report(&self, attempt: u64, sent: u64) {
        let mut inner = self.lock();
        if !self.is_current(&inner, attempt) {
            return;
        }
        // The final 100% is reported once the server has answered.
        if sent <= inner.uploaded_bytes || sent >= self.source.size() {
            return;
        }
        inner.uploaded_bytes = sent;
        let progress = self.progress_event(&inner);
        drop(inner);
        self.callbacks.progress(progress);
    }

    fn finish(&self, attempt: u64, record: RemoteFileRecord) {
        let mut inner = self.lock();
        if !self.is_current(&inner, attempt) {
            debug!(session = %self.id, "stale upload result discarded");
            return;
        }
        inner.state = UploadState::Completed;
        inner.in_flight = false;
        inner.uploaded_bytes = self.source.size();
        inner.record = Some(record);
        let status = self.status_event(&inner);
        let progress = self.progress_event(&inner);
        drop(inner);

        info!(session = %self.id, file = %self.source.name(), "upload completed");
        self.callbacks.progress(progress);
        self.callbacks.status(status);
    }

    fn fail(&self, attempt: u64, err: UploadError) {
        let mut inner = self.lock();
        if !self.is_current(&inner, attempt) {
            return;
        }
        let message = err.to_string();
        inner.state = UploadState::Failed;
        inner.in_flight = false;
        inner.last_error = Some(message.clone());
        let status = self.status_event(&inner);
        drop(inner);

        error!(session = %self.id, error = %message, "upload failed");
        self.callbacks.status(status);
    }
}
