//! Resumable multipart upload session.
//!
//! A session owns one file's journey through `init → part 1..N → complete`.
//! Acknowledged parts are kept across pause, resume and failure, so a
//! resumed session continues at the first unacknowledged chunk. Only
//! [`cancel`](UploadControl::cancel) throws remote progress away.
//!
//! Each `start`/`resume` spawns a driver task tagged with a run number.
//! A driver whose run is no longer current stops at its next step and
//! any late result it produces is dropped, so a pause followed by a
//! quick resume can never commit a chunk twice.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use stashbox_protocol::{
    AbortMultipartRequest, CompleteMultipartRequest, CompletedPart, InitMultipartRequest,
    RemoteFileRecord, UploadState,
};
use stashbox_remote_store::RemoteStore;
use stashbox_transfer::{ChunkPlan, ThroughputMeter, UploadSource, normalize_folder, read_chunk};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::UploaderConfig;
use crate::control::{
    ProgressEvent, SessionCallbacks, SessionSnapshot, StatusEvent, UploadControl, percent,
};
use crate::error::{TransportError, UploadError};
use crate::transport::ChunkTransport;

/// Everything needed to build a session for one file.
pub struct SessionSetup {
    pub id: String,
    pub source: Arc<dyn UploadSource>,
    /// Normalised virtual folder; empty is the root.
    pub folder: String,
    pub chunk_size: u64,
    pub chunk_timeout: Option<Duration>,
    /// Shared permit pool bounding concurrent transfers.
    pub limiter: Option<Arc<Semaphore>>,
}

impl SessionSetup {
    /// Validates `folder` and takes chunking settings from `config`.
    pub fn new(
        id: impl Into<String>,
        source: Arc<dyn UploadSource>,
        folder: &str,
        config: &UploaderConfig,
    ) -> Result<Self, UploadError> {
        let folder = normalize_folder(folder).map_err(UploadError::from_folder)?;
        Ok(Self {
            id: id.into(),
            source,
            folder,
            chunk_size: config.effective_chunk_size(),
            chunk_timeout: config.chunk_timeout(),
            limiter: None,
        })
    }

    pub fn with_limiter(mut self, limiter: Arc<Semaphore>) -> Self {
        self.limiter = Some(limiter);
        self
    }
}

/// Multipart upload of one file.
pub struct UploadSession {
    shared: Arc<Shared>,
}

struct Shared {
    id: String,
    source: Arc<dyn UploadSource>,
    folder: String,
    plan: ChunkPlan,
    store: Arc<dyn RemoteStore>,
    transport: ChunkTransport,
    limiter: Option<Arc<Semaphore>>,
    callbacks: SessionCallbacks,
    inner: Mutex<Inner>,
}

struct Inner {
    state: UploadState,
    upload_id: Option<String>,
    remote_key: Option<String>,
    /// Acknowledged parts, contiguous from part 1.
    parts: Vec<CompletedPart>,
    next_chunk: u64,
    uploaded_bytes: u64,
    last_error: Option<String>,
    record: Option<RemoteFileRecord>,
    /// Incremented by every start/resume.
    run: u64,
    /// Incremented by every cancel. Remote ids obtained under an older
    /// epoch belong to a discarded upload.
    epoch: u64,
    run_token: CancellationToken,
    meter: ThroughputMeter,
    /// Runtime of the first launch. Later commands spawn onto it so they
    /// work from threads outside any runtime.
    runtime: Option<Handle>,
}

impl Inner {
    fn reset_progress(&mut self) {
        self.upload_id = None;
        self.remote_key = None;
        self.parts.clear();
        self.next_chunk = 0;
        self.uploaded_bytes = 0;
        self.last_error = None;
        self.record = None;
        self.meter.reset();
    }
}

enum Step {
    Init {
        epoch: u64,
    },
    Chunk {
        index: u64,
        upload_id: String,
        key: String,
    },
    Complete {
        epoch: u64,
        request: CompleteMultipartRequest,
    },
}

impl UploadSession {
    pub fn new(
        setup: SessionSetup,
        store: Arc<dyn RemoteStore>,
        callbacks: SessionCallbacks,
    ) -> Self {
        let plan = ChunkPlan::new(setup.source.size(), setup.chunk_size);
        let transport = ChunkTransport::new(Arc::clone(&store), setup.chunk_timeout);
        let run_token = CancellationToken::new();
        Self {
            shared: Arc::new(Shared {
                id: setup.id,
                source: setup.source,
                folder: setup.folder,
                plan,
                store,
                transport,
                limiter: setup.limiter,
                callbacks,
                inner: Mutex::new(Inner {
                    state: UploadState::Pending,
                    upload_id: None,
                    remote_key: None,
                    parts: Vec::new(),
                    next_chunk: 0,
                    uploaded_bytes: 0,
                    last_error: None,
                    record: None,
                    run: 0,
                    epoch: 0,
                    run_token,
                    meter: ThroughputMeter::default(),
                    runtime: None,
                }),
            }),
        }
    }

    pub fn total_chunks(&self) -> u64 {
        self.shared.plan.total_chunks()
    }

    /// Index of the first chunk not yet acknowledged.
    pub fn next_chunk_index(&self) -> u64 {
        self.shared.lock().next_chunk
    }

    pub fn committed_parts(&self) -> Vec<CompletedPart> {
        self.shared.lock().parts.clone()
    }

    pub fn upload_id(&self) -> Option<String> {
        self.shared.lock().upload_id.clone()
    }

    pub fn remote_key(&self) -> Option<String> {
        self.shared.lock().remote_key.clone()
    }
}

impl UploadControl for UploadSession {
    fn id(&self) -> &str {
        &self.shared.id
    }

    fn start(&self) {
        let mut inner = self.shared.lock();
        match inner.state {
            UploadState::Uploading | UploadState::Completed => return,
            UploadState::Cancelled => inner.reset_progress(),
            UploadState::Pending | UploadState::Paused | UploadState::Failed => {}
        }
        self.shared.launch(inner);
    }

    fn pause(&self) {
        let mut inner = self.shared.lock();
        if inner.state != UploadState::Uploading {
            return;
        }
        inner.state = UploadState::Paused;
        inner.run_token.cancel();
        self.shared.transport.abort_in_flight();
        let status = self.shared.status_event(&inner);
        let next_chunk = inner.next_chunk;
        drop(inner);

        info!(session = %self.shared.id, next_chunk, "upload paused");
        self.shared.callbacks.status(status);
    }

    fn resume(&self) {
        let inner = self.shared.lock();
        match inner.state {
            UploadState::Paused | UploadState::Failed => self.shared.launch(inner),
            UploadState::Cancelled => {
                drop(inner);
                self.start();
            }
            _ => {}
        }
    }

    fn cancel(&self) {
        let mut inner = self.shared.lock();
        if matches!(inner.state, UploadState::Completed | UploadState::Cancelled) {
            return;
        }
        inner.state = UploadState::Cancelled;
        inner.run_token.cancel();
        inner.epoch += 1;
        self.shared.transport.abort_in_flight();
        let remote = inner.upload_id.take().zip(inner.remote_key.take());
        let runtime = inner.runtime.clone();
        inner.reset_progress();
        let status = self.shared.status_event(&inner);
        drop(inner);

        info!(session = %self.shared.id, "upload cancelled");
        if let (Some((upload_id, key)), Some(runtime)) = (remote, runtime) {
            self.shared.abort_remote(&runtime, upload_id, key);
        }
        self.shared.callbacks.status(status);
    }

    fn snapshot(&self) -> SessionSnapshot {
        let inner = self.shared.lock();
        SessionSnapshot {
            session_id: self.shared.id.clone(),
            display_name: self.shared.source.name().to_string(),
            state: inner.state,
            uploaded_bytes: inner.uploaded_bytes,
            total_bytes: self.shared.plan.file_size(),
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
        let total = self.plan.file_size();
        ProgressEvent {
            session_id: self.id.clone(),
            uploaded_bytes: inner.uploaded_bytes,
            total_bytes: total,
            percent: percent(inner.state, inner.uploaded_bytes, total),
            bytes_per_second: inner.meter.bytes_per_second(),
            eta: inner.meter.eta(total.saturating_sub(inner.uploaded_bytes)),
        }
    }

    /// Moves to Uploading and spawns a driver for a fresh run.
    fn launch(self: &Arc<Self>, mut inner: MutexGuard<'_, Inner>) {
        let runtime = inner.runtime.get_or_insert_with(Handle::current).clone();
        inner.state = UploadState::Uploading;
        inner.last_error = None;
        inner.run += 1;
        inner.run_token = CancellationToken::new();
        inner.meter.reset();
        let run = inner.run;
        let token = inner.run_token.clone();
        let next_chunk = inner.next_chunk;
        let status = self.status_event(&inner);
        let progress = self.progress_event(&inner);
        drop(inner);

        info!(
            session = %self.id,
            run,
            next_chunk,
            total_chunks = self.plan.total_chunks(),
            "upload running"
        );
        self.callbacks.status(status);
        self.callbacks.progress(progress);

        let shared = Arc::clone(self);
        runtime.spawn(async move { shared.drive(run, token).await });
    }

    async fn drive(self: Arc<Self>, run: u64, token: CancellationToken) {
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

        while let Some(step) = self.next_step(run) {
            let flow = match step {
                Step::Init { epoch } => self.init(run, epoch).await,
                Step::Chunk {
                    index,
                    upload_id,
                    key,
                } => self.send_chunk(run, &token, index, &upload_id, &key).await,
                Step::Complete { epoch, request } => self.complete(run, epoch, request).await,
            };
            if flow.is_break() {
                break;
            }
        }
        debug!(session = %self.id, run, "driver stopped");
    }

    fn next_step(&self, run: u64) -> Option<Step> {
        let inner = self.lock();
        if inner.run != run || inner.state != UploadState::Uploading {
            return None;
        }
        let (Some(upload_id), Some(key)) = (&inner.upload_id, &inner.remote_key) else {
            return Some(Step::Init { epoch: inner.epoch });
        };
        if inner.next_chunk < self.plan.total_chunks() {
            return Some(Step::Chunk {
                index: inner.next_chunk,
                upload_id: upload_id.clone(),
                key: key.clone(),
            });
        }
        Some(Step::Complete {
            epoch: inner.epoch,
            request: CompleteMultipartRequest {
                upload_id: upload_id.clone(),
                key: key.clone(),
                parts: inner.parts.clone(),
                file_name: self.source.name().to_string(),
                folder: self.folder.clone(),
                size: self.plan.file_size(),
                content_type: self.source.mime_type().to_string(),
            },
        })
    }

    async fn init(&self, run: u64, epoch: u64) -> ControlFlow<()> {
        let request = InitMultipartRequest {
            file_name: self.source.name().to_string(),
            folder: self.folder.clone(),
            content_type: self.source.mime_type().to_string(),
        };
        let response = match self.store.init_multipart(request).await {
            Ok(response) => response,
            Err(e) => {
                self.fail(run, UploadError::Init(e.to_string()));
                return ControlFlow::Break(());
            }
        };

        let mut inner = self.lock();
        if inner.epoch != epoch || inner.upload_id.is_some() {
            // Cancelled while init was in flight, or a newer run got there first.
            drop(inner);
            debug!(session = %self.id, upload_id = %response.upload_id, "discarding superseded multipart upload");
            self.abort_remote(&Handle::current(), response.upload_id, response.key);
        } else {
            info!(
                session = %self.id,
                upload_id = %response.upload_id,
                key = %response.key,
                "multipart upload initialised"
            );
            inner.upload_id = Some(response.upload_id);
            inner.remote_key = Some(response.key);
        }
        ControlFlow::Continue(())
    }

    async fn send_chunk(
        &self,
        run: u64,
        token: &CancellationToken,
        index: u64,
        upload_id: &str,
        key: &str,
    ) -> ControlFlow<()> {
        let chunk = match read_chunk(self.source.as_ref(), &self.plan, index).await {
            Ok(chunk) => chunk,
            Err(e) => {
                self.fail(run, UploadError::Read(e));
                return ControlFlow::Break(());
            }
        };
        let part_number = chunk.part_number();
        let bytes = chunk.len();

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransportError::Aborted),
            r = self.transport.send_chunk(chunk, upload_id, key) => r,
        };

        match result {
            Ok(part) => {
                let mut inner = self.lock();
                if inner.run != run || inner.state != UploadState::Uploading {
                    debug!(session = %self.id, part = part_number, "late part acknowledgement discarded");
                    return ControlFlow::Break(());
                }
                debug_assert_eq!(u64::from(part.part_number), inner.next_chunk + 1);
                inner.parts.push(part);
                inner.next_chunk += 1;
                inner.uploaded_bytes = self.plan.bytes_before(inner.next_chunk);
                inner.meter.record(bytes);
                let progress = self.progress_event(&inner);
                drop(inner);

                debug!(session = %self.id, part = part_number, bytes, "part committed");
                self.callbacks.progress(progress);
                ControlFlow::Continue(())
            }
            Err(TransportError::Aborted) => {
                let inner = self.lock();
                if inner.run == run && inner.state == UploadState::Uploading {
                    // Aborted on behalf of a run that has since been replaced
                    // by this one; send the same chunk again.
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(())
                }
            }
            Err(source) => {
                self.fail(
                    run,
                    UploadError::ChunkTransport {
                        part_number,
                        source,
                    },
                );
                ControlFlow::Break(())
            }
        }
    }

    async fn complete(
        &self,
        run: u64,
        epoch: u64,
        request: CompleteMultipartRequest,
    ) -> ControlFlow<()> {
        debug!(session = %self.id, parts = request.parts.len(), "completing multipart upload");
        match self.store.complete_multipart(request).await {
            Ok(record) => self.finish(epoch, record),
            Err(e) => self.fail(run, UploadError::Completion(e.to_string())),
        }
        ControlFlow::Break(())
    }

    fn finish(&self, epoch: u64, record: RemoteFileRecord) {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            warn!(session = %self.id, file_id = %record.id, "upload completed after cancel; result discarded");
            return;
        }
        if inner.state == UploadState::Completed {
            return;
        }
        inner.state = UploadState::Completed;
        inner.uploaded_bytes = self.plan.file_size();
        inner.last_error = None;
        inner.record = Some(record);
        let status = self.status_event(&inner);
        let progress = self.progress_event(&inner);
        drop(inner);

        info!(session = %self.id, file = %self.source.name(), "upload completed");
        self.callbacks.progress(progress);
        self.callbacks.status(status);
    }

    /// Moves the current run to Failed. Results from superseded runs are ignored.
    fn fail(&self, run: u64, err: UploadError) {
        let mut inner = self.lock();
        if inner.run != run || inner.state != UploadState::Uploading {
            debug!(session = %self.id, error = %err, "failure from superseded run ignored");
            return;
        }
        let message = err.to_string();
        inner.state = UploadState::Failed;
        inner.last_error = Some(message.clone());
        let status = self.status_event(&inner);
        drop(inner);

        error!(session = %self.id, error = %message, "upload failed");
        self.callbacks.status(status);
    }

    /// Best-effort remote abort. Runs detached; failures are only logged.
    fn abort_remote(&self, runtime: &Handle, upload_id: String, key: String) {
        let store = Arc::clone(&self.store);
        let session = self.id.clone();
        runtime.spawn(async move {
            let request = AbortMultipartRequest {
                upload_id: upload_id.clone(),
                key,
            };
            match store.abort_multipart(request).await {
                Ok(()) => debug!(session = %session, upload_id = %upload_id, "multipart upload aborted"),
                Err(e) => warn!(
                    session = %session,
                    upload_id = %upload_id,
                    error = %e,
                    "failed to abort multipart upload"
                ),
            }
        });
    }
}
