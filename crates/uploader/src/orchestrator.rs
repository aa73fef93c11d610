//! Upload queue.
//!
//! Owns every session created by the UI, picks the single-request or
//! multipart path per file, enforces the guest file quota and exposes
//! queue-wide aggregates.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stashbox_protocol::{QueueEntry, UploadState};
use stashbox_remote_store::{CredentialProvider, RemoteStore};
use stashbox_transfer::{ChunkPlan, UploadSource};
use tokio::sync::{Semaphore, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::UploaderConfig;
use crate::control::{ProgressEvent, SessionCallbacks, SessionSnapshot, StatusEvent, UploadControl};
use crate::error::UploadError;
use crate::session::{SessionSetup, UploadSession};
use crate::small::SmallUploadSession;

/// Session events re-published on the queue channel.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Status(StatusEvent),
    Progress(ProgressEvent),
}

/// Manages all upload sessions.
pub struct UploadOrchestrator {
    store: Arc<dyn RemoteStore>,
    credentials: Arc<dyn CredentialProvider>,
    config: UploaderConfig,
    limiter: Option<Arc<Semaphore>>,
    queue: Mutex<Queue>,
    events_tx: mpsc::UnboundedSender<QueueEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<QueueEvent>>,
}

#[derive(Default)]
struct Queue {
    /// In enqueue order.
    sessions: Vec<Arc<dyn UploadControl>>,
    /// Ids of files already stored remotely.
    known_files: HashSet<String>,
}

impl Queue {
    /// Files counted against the guest quota: stored ones plus every
    /// queued upload that has not been cancelled.
    fn held_files(&self) -> usize {
        let mut held = self.known_files.len();
        for session in &self.sessions {
            let snap = session.snapshot();
            match snap.state {
                UploadState::Cancelled => {}
                UploadState::Completed => {
                    let already_known = snap
                        .record
                        .as_ref()
                        .is_some_and(|r| self.known_files.contains(&r.id));
                    if !already_known {
                        held += 1;
                    }
                }
                _ => held += 1,
            }
        }
        held
    }
}

impl UploadOrchestrator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        credentials: Arc<dyn CredentialProvider>,
        config: UploaderConfig,
    ) -> Self {
        let limiter = config
            .max_concurrent_uploads
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            store,
            credentials,
            config,
            limiter,
            queue: Mutex::new(Queue::default()),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the queue event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<QueueEvent>> {
        self.events_rx.take()
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Queues `source` for upload into `folder` and starts it.
    ///
    /// Files no larger than one chunk go through a single request; larger
    /// ones through a resumable multipart session. Folder validation and
    /// the guest quota are checked before anything touches the network.
    pub fn enqueue(
        &self,
        source: Arc<dyn UploadSource>,
        folder: &str,
        callbacks: SessionCallbacks,
    ) -> Result<String, UploadError> {
        let id = Uuid::new_v4().to_string();
        let mut setup = SessionSetup::new(id.clone(), Arc::clone(&source), folder, &self.config)?;
        if let Some(limiter) = &self.limiter {
            setup = setup.with_limiter(Arc::clone(limiter));
        }
        let callbacks = self.forwarding(callbacks);

        let single_request =
            ChunkPlan::new(source.size(), self.config.effective_chunk_size()).fits_single_request();
        let session: Arc<dyn UploadControl> = if single_request {
            Arc::new(SmallUploadSession::new(setup, Arc::clone(&self.store), callbacks))
        } else {
            Arc::new(UploadSession::new(setup, Arc::clone(&self.store), callbacks))
        };

        let identity = self.credentials.identity();
        {
            let mut queue = self.lock();
            if let Some(limit) = self.config.guest_file_limit.filter(|_| identity.is_guest()) {
                let held = queue.held_files();
                if held >= limit {
                    warn!(user = %identity.user_id, held, limit, "guest file limit reached");
                    return Err(UploadError::LimitExceeded { limit });
                }
            }
            queue.sessions.push(Arc::clone(&session));
        }

        info!(
            session = %id,
            file = %source.name(),
            size = source.size(),
            single_request,
            "upload queued"
        );
        session.start();
        Ok(id)
    }

    pub fn pause(&self, id: &str) {
        if let Some(session) = self.find(id) {
            session.pause();
        }
    }

    pub fn resume(&self, id: &str) {
        if let Some(session) = self.find(id) {
            session.resume();
        }
    }

    pub fn cancel(&self, id: &str) {
        if let Some(session) = self.find(id) {
            session.cancel();
        }
    }

    /// Retries a failed upload or starts a cancelled one over.
    pub fn restart(&self, id: &str) {
        if let Some(session) = self.find(id) {
            session.start();
        }
    }

    /// Drops a session from the queue, cancelling it first unless it
    /// already finished. Returns `false` for unknown ids.
    pub fn remove(&self, id: &str) -> bool {
        let removed = {
            let mut queue = self.lock();
            match queue.sessions.iter().position(|s| s.id() == id) {
                Some(pos) => queue.sessions.remove(pos),
                None => return false,
            }
        };
        if !matches!(
            removed.state(),
            UploadState::Completed | UploadState::Cancelled
        ) {
            removed.cancel();
        }
        info!(session = %id, "upload removed from queue");
        true
    }

    pub fn session(&self, id: &str) -> Option<SessionSnapshot> {
        self.find(id).map(|s| s.snapshot())
    }

    pub fn entries(&self) -> Vec<QueueEntry> {
        self.sessions()
            .iter()
            .map(|session| {
                let snap = session.snapshot();
                QueueEntry {
                    progress_percent: snap.percent(),
                    session_id: snap.session_id,
                    display_name: snap.display_name,
                    state: snap.state,
                    last_error: snap.last_error,
                }
            })
            .collect()
    }

    /// Mean progress over all queued sessions; 0 for an empty queue.
    pub fn aggregate_progress(&self) -> f64 {
        let sessions = self.sessions();
        if sessions.is_empty() {
            return 0.0;
        }
        let total: f64 = sessions.iter().map(|s| s.snapshot().percent()).sum();
        total / sessions.len() as f64
    }

    /// Sessions that are pending or uploading.
    pub fn active_count(&self) -> usize {
        self.sessions()
            .iter()
            .filter(|s| s.state().is_active())
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }

    /// Removes completed sessions. Their files keep counting against the
    /// guest quota.
    pub fn clear_finished(&self) -> usize {
        let mut queue = self.lock();
        let before = queue.sessions.len();
        let mut finished = Vec::new();
        queue.sessions.retain(|session| {
            let snap = session.snapshot();
            if !snap.state.is_terminal() {
                return true;
            }
            if let Some(record) = snap.record {
                finished.push(record.id);
            }
            false
        });
        queue.known_files.extend(finished);
        before - queue.sessions.len()
    }

    /// Refreshes the quota baseline from the caller's stored files.
    /// Folder markers do not count. Returns the number of files found.
    pub async fn sync_existing_count(&self) -> Result<usize, UploadError> {
        let files = self.store.list_files(None).await?;
        let ids: HashSet<String> = files
            .into_iter()
            .filter(|f| !f.is_folder_marker())
            .map(|f| f.id)
            .collect();
        let count = ids.len();
        self.lock().known_files = ids;
        info!(count, "synced stored file count");
        Ok(count)
    }

    fn forwarding(&self, callbacks: SessionCallbacks) -> SessionCallbacks {
        let status_tx = self.events_tx.clone();
        let progress_tx = self.events_tx.clone();
        let status_cb = callbacks.clone();
        SessionCallbacks::new()
            .on_status(move |event| {
                status_cb.status(event.clone());
                let _ = status_tx.send(QueueEvent::Status(event));
            })
            .on_progress(move |event| {
                callbacks.progress(event.clone());
                let _ = progress_tx.send(QueueEvent::Progress(event));
            })
    }

    fn find(&self, id: &str) -> Option<Arc<dyn UploadControl>> {
        self.lock().sessions.iter().find(|s| s.id() == id).cloned()
    }

    // Cloned out so session locks are never taken under the queue lock
    // longer than needed.
    fn sessions(&self) -> Vec<Arc<dyn UploadControl>> {
        self.lock().sessions.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
