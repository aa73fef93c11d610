//! In-memory remote store and event recorder shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stashbox_protocol::{
    AbortMultipartRequest, CompleteMultipartRequest, InitMultipartRequest, InitMultipartResponse,
    RemoteFileRecord, UploadPartResponse, UploadState,
};
use stashbox_remote_store::{
    ByteProgress, PartUpload, RemoteStore, RemoteStoreError, StoreFuture, WholeFileUpload,
};
use tokio::sync::{Notify, Semaphore};

use crate::control::{ProgressEvent, SessionCallbacks, StatusEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum GateKey {
    Init,
    Part(u32),
    Complete,
    Whole,
}

/// Blocks one store call until released.
pub(crate) struct Gate {
    entered: Notify,
    released: Semaphore,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            entered: Notify::new(),
            released: Semaphore::new(0),
        }
    }
}

impl Gate {
    /// Resolves once the gated call has started.
    pub(crate) async fn entered(&self) {
        self.entered.notified().await;
    }

    pub(crate) fn release(&self) {
        self.released.add_permits(1);
    }

    async fn pass(&self) {
        self.entered.notify_one();
        if let Ok(permit) = self.released.acquire().await {
            permit.forget();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Init {
        file_name: String,
        folder: String,
    },
    Part {
        upload_id: String,
        part_number: u32,
        len: usize,
    },
    Complete {
        upload_id: String,
        parts: Vec<u32>,
        size: u64,
    },
    Abort {
        upload_id: String,
    },
    Whole {
        file_name: String,
        folder: String,
        len: usize,
    },
    List,
    Delete {
        id: String,
    },
    Move {
        id: String,
        folder: String,
    },
    CreateFolder {
        path: String,
    },
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    uploads: u32,
    gates: HashMap<GateKey, Arc<Gate>>,
    init_failures: VecDeque<RemoteStoreError>,
    part_failures: HashMap<u32, VecDeque<RemoteStoreError>>,
    complete_failures: VecDeque<RemoteStoreError>,
    whole_failures: VecDeque<RemoteStoreError>,
    files: Vec<RemoteFileRecord>,
}

/// Scriptable [`RemoteStore`] that records every call.
#[derive(Default)]
pub(crate) struct MockStore {
    state: Mutex<MockState>,
    completions: AtomicUsize,
}

impl MockStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next call matching `key` blocks until the gate is released.
    pub(crate) fn hold(&self, key: GateKey) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.state
            .lock()
            .unwrap()
            .gates
            .insert(key, Arc::clone(&gate));
        gate
    }

    pub(crate) fn fail_init_once(&self, err: RemoteStoreError) {
        self.state.lock().unwrap().init_failures.push_back(err);
    }

    pub(crate) fn fail_part_once(&self, part_number: u32, err: RemoteStoreError) {
        self.state
            .lock()
            .unwrap()
            .part_failures
            .entry(part_number)
            .or_default()
            .push_back(err);
    }

    pub(crate) fn fail_complete_once(&self, err: RemoteStoreError) {
        self.state.lock().unwrap().complete_failures.push_back(err);
    }

    pub(crate) fn fail_whole_once(&self, err: RemoteStoreError) {
        self.state.lock().unwrap().whole_failures.push_back(err);
    }

    pub(crate) fn set_files(&self, files: Vec<RemoteFileRecord>) {
        self.state.lock().unwrap().files = files;
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn init_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Init { .. }))
            .count()
    }

    pub(crate) fn part_calls(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Part { part_number, .. } => Some(part_number),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn complete_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Complete { .. }))
            .collect()
    }

    pub(crate) fn abort_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Abort { upload_id } => Some(upload_id),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn whole_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Whole { .. }))
            .count()
    }

    /// Successful completions handed back to callers.
    pub(crate) fn completions_returned(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call, gate: Option<GateKey>) -> Option<Arc<Gate>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        gate.and_then(|key| state.gates.remove(&key))
    }

    async fn pass(&self, call: Call, gate: GateKey) {
        if let Some(gate) = self.record(call, Some(gate)) {
            gate.pass().await;
        }
    }
}

pub(crate) fn file_record(id: &str, name: &str, folder: &str, size: u64) -> RemoteFileRecord {
    RemoteFileRecord {
        id: id.into(),
        key: format!("uploads/{name}"),
        name: name.into(),
        size,
        mime_type: "application/octet-stream".into(),
        created_at: 1_700_000_000_000,
        url: format!("https://files.test/{id}"),
        folder: folder.into(),
        owner_id: "user-1".into(),
    }
}

impl RemoteStore for MockStore {
    fn init_multipart(
        &self,
        req: InitMultipartRequest,
    ) -> StoreFuture<'_, InitMultipartResponse> {
        Box::pin(async move {
            let call = Call::Init {
                file_name: req.file_name.clone(),
                folder: req.folder.clone(),
            };
            self.pass(call, GateKey::Init).await;

            let mut state = self.state.lock().unwrap();
            if let Some(err) = state.init_failures.pop_front() {
                return Err(err);
            }
            state.uploads += 1;
            Ok(InitMultipartResponse {
                upload_id: format!("up-{}", state.uploads),
                key: format!("uploads/{}-{}", req.file_name, state.uploads),
            })
        })
    }

    fn upload_part(&self, part: PartUpload) -> StoreFuture<'_, UploadPartResponse> {
        Box::pin(async move {
            let call = Call::Part {
                upload_id: part.upload_id.clone(),
                part_number: part.part_number,
                len: part.data.len(),
            };
            self.pass(call, GateKey::Part(part.part_number)).await;

            let mut state = self.state.lock().unwrap();
            if let Some(err) = state
                .part_failures
                .get_mut(&part.part_number)
                .and_then(VecDeque::pop_front)
            {
                return Err(err);
            }
            Ok(UploadPartResponse {
                etag: format!("etag-{}-{}", part.upload_id, part.part_number),
            })
        })
    }

    fn complete_multipart(
        &self,
        req: CompleteMultipartRequest,
    ) -> StoreFuture<'_, RemoteFileRecord> {
        Box::pin(async move {
            let call = Call::Complete {
                upload_id: req.upload_id.clone(),
                parts: req.parts.iter().map(|p| p.part_number).collect(),
                size: req.size,
            };
            self.pass(call, GateKey::Complete).await;

            if let Some(err) = self.state.lock().unwrap().complete_failures.pop_front() {
                return Err(err);
            }
            let mut record = file_record(
                &format!("file-{}", req.upload_id),
                &req.file_name,
                &req.folder,
                req.size,
            );
            record.key = req.key;
            record.mime_type = req.content_type;
            self.completions.fetch_add(1, Ordering::SeqCst);
            Ok(record)
        })
    }

    fn abort_multipart(&self, req: AbortMultipartRequest) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.record(
                Call::Abort {
                    upload_id: req.upload_id,
                },
                None,
            );
            Ok(())
        })
    }

    fn upload_whole(
        &self,
        upload: WholeFileUpload,
        progress: Option<ByteProgress>,
    ) -> StoreFuture<'_, RemoteFileRecord> {
        Box::pin(async move {
            let len = upload.data.len();
            let call = Call::Whole {
                file_name: upload.file_name.clone(),
                folder: upload.folder.clone(),
                len,
            };
            if let Some(report) = &progress {
                report((len / 2) as u64);
            }
            self.pass(call, GateKey::Whole).await;

            if let Some(err) = self.state.lock().unwrap().whole_failures.pop_front() {
                return Err(err);
            }
            if let Some(report) = &progress {
                report(len as u64);
            }
            let mut record = file_record(
                &format!("file-{}", upload.file_name),
                &upload.file_name,
                &upload.folder,
                len as u64,
            );
            record.mime_type = upload.content_type;
            Ok(record)
        })
    }

    fn list_files(&self, folder: Option<String>) -> StoreFuture<'_, Vec<RemoteFileRecord>> {
        Box::pin(async move {
            self.record(Call::List, None);
            let files = self.state.lock().unwrap().files.clone();
            Ok(match folder {
                Some(folder) => files.into_iter().filter(|f| f.folder == folder).collect(),
                None => files,
            })
        })
    }

    fn delete_file(&self, id: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.record(Call::Delete { id }, None);
            Ok(())
        })
    }

    fn move_file(&self, id: String, folder: String) -> StoreFuture<'_, RemoteFileRecord> {
        Box::pin(async move {
            self.record(
                Call::Move {
                    id: id.clone(),
                    folder: folder.clone(),
                },
                None,
            );
            Ok(file_record(&id, "moved.bin", &folder, 0))
        })
    }

    fn create_folder(&self, path: String) -> StoreFuture<'_, RemoteFileRecord> {
        Box::pin(async move {
            self.record(Call::CreateFolder { path: path.clone() }, None);
            Ok(file_record(&format!("dir-{path}"), ".folder", &path, 0))
        })
    }
}

/// Collects session callbacks for assertions.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    statuses: Arc<Mutex<Vec<StatusEvent>>>,
    progress: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl Recorder {
    pub(crate) fn callbacks(&self) -> SessionCallbacks {
        let statuses = Arc::clone(&self.statuses);
        let progress = Arc::clone(&self.progress);
        SessionCallbacks::new()
            .on_status(move |e| statuses.lock().unwrap().push(e))
            .on_progress(move |e| progress.lock().unwrap().push(e))
    }

    pub(crate) fn statuses(&self) -> Vec<StatusEvent> {
        self.statuses.lock().unwrap().clone()
    }

    pub(crate) fn states(&self) -> Vec<UploadState> {
        self.statuses().into_iter().map(|e| e.state).collect()
    }

    pub(crate) fn progress(&self) -> Vec<ProgressEvent> {
        self.progress.lock().unwrap().clone()
    }

    /// Waits until a status event with `state` has been delivered.
    pub(crate) async fn wait_for_state(&self, state: UploadState) {
        wait_until(&format!("{state:?} event"), || self.states().contains(&state)).await;
    }
}

/// Polls `cond` until it holds, panicking after five seconds.
pub(crate) async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let poll = async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(5), poll).await.is_err() {
        panic!("timed out waiting for {what}");
    }
}
