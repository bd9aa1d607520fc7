//! Concurrent staging of payloads.
//!
//! Every registered payload starts uploading immediately on its own task.
//! The coordinator keeps a status channel and a cancellation token per task
//! so the run can wait on all of them, fail fast on the first error and
//! cancel whatever is still in flight.

use crate::{keys::KeyFactory, lock, payload::Payload};
use chrono::Utc;
use connectors::{error::StoreError, store::ObjectStager};
use engine_core::{error::LoadError, observer::LoadObserver};
use futures::future::try_join_all;
use model::{
    core::identifiers::RunId,
    events::LoadEvent,
    load::{TaskHandle, UploadState},
};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct TaskStatus {
    state: UploadState,
    error: Option<Arc<StoreError>>,
}

impl TaskStatus {
    fn new(state: UploadState) -> Self {
        Self { state, error: None }
    }
}

struct TaskSlot {
    index: usize,
    key: String,
    status: watch::Receiver<TaskStatus>,
    cancel: CancellationToken,
}

impl TaskSlot {
    fn handle(&self) -> TaskHandle {
        let status = self.status.borrow();
        TaskHandle {
            index: self.index,
            key: self.key.clone(),
            state: status.state,
            error: status.error.as_ref().map(|e| e.to_string()),
        }
    }
}

#[derive(Default)]
struct Inner {
    sealed: bool,
    tasks: Vec<TaskSlot>,
}

pub struct UploadCoordinator {
    run_id: RunId,
    bucket: String,
    keys: KeyFactory,
    stager: Arc<dyn ObjectStager>,
    observer: Arc<dyn LoadObserver>,
    inner: Mutex<Inner>,
}

impl UploadCoordinator {
    pub fn new(
        run_id: RunId,
        bucket: impl Into<String>,
        keys: KeyFactory,
        stager: Arc<dyn ObjectStager>,
        observer: Arc<dyn LoadObserver>,
    ) -> Self {
        Self {
            run_id,
            bucket: bucket.into(),
            keys,
            stager,
            observer,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Registers a payload and starts staging it right away. Rejected once
    /// the coordinator has been sealed.
    pub fn register(&self, payload: Payload) -> Result<TaskHandle, LoadError> {
        let mut inner = lock(&self.inner);
        if inner.sealed {
            warn!(run_id = %self.run_id, "Payload rejected, load already started");
            return Err(LoadError::AlreadyStarted);
        }

        let index = inner.tasks.len();
        let key = self.keys.payload_key(index);
        let (tx, rx) = watch::channel(TaskStatus::new(UploadState::Pending));
        let cancel = CancellationToken::new();

        let slot = TaskSlot {
            index,
            key: key.clone(),
            status: rx,
            cancel: cancel.clone(),
        };
        let handle = slot.handle();
        inner.tasks.push(slot);
        drop(inner);

        debug!(run_id = %self.run_id, index, key = %key, ?payload, "Registered payload");

        let stager = self.stager.clone();
        let observer = self.observer.clone();
        let bucket = self.bucket.clone();
        let run_id = self.run_id.clone();

        tokio::spawn(async move {
            tx.send_replace(TaskStatus::new(UploadState::InFlight));
            let body = payload.into_stage_body();

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(StoreError::Cancelled),
                res = stager.put(&bucket, &key, body) => res,
            };

            match outcome {
                Ok(receipt) => {
                    info!(run_id = %run_id, index, key = %key, bytes = receipt.bytes, "Payload staged");
                    observer.notify(&LoadEvent::FileUploaded {
                        run_id,
                        index,
                        key,
                        bytes: Some(receipt.bytes),
                        timestamp: Utc::now(),
                    });
                    tx.send_replace(TaskStatus::new(UploadState::Uploaded));
                }
                Err(e) => {
                    warn!(run_id = %run_id, index, key = %key, error = %e, "Payload staging failed");
                    observer.notify(&LoadEvent::FileUploadFailed {
                        run_id,
                        index,
                        key,
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    tx.send_replace(TaskStatus {
                        state: UploadState::Failed,
                        error: Some(Arc::new(e)),
                    });
                }
            }
        });

        Ok(handle)
    }

    /// Stops accepting registrations.
    pub fn seal(&self) {
        lock(&self.inner).sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        lock(&self.inner).sealed
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once every task is uploaded, in registration order. Rejects
    /// with the first failure to settle; the remaining tasks keep running.
    pub async fn await_all(&self) -> Result<Vec<TaskHandle>, LoadError> {
        let waits: Vec<_> = lock(&self.inner)
            .tasks
            .iter()
            .map(|slot| (slot.index, slot.key.clone(), slot.status.clone()))
            .collect();

        let waits = waits.into_iter().map(|(index, key, mut status)| async move {
            let settled = match status.wait_for(|s| s.state.is_settled()).await {
                Ok(status) => status.clone(),
                Err(_) => TaskStatus {
                    state: UploadState::Failed,
                    error: Some(Arc::new(StoreError::Other(
                        "upload task ended without reporting".into(),
                    ))),
                },
            };

            match settled.state {
                UploadState::Uploaded => Ok(TaskHandle {
                    index,
                    key,
                    state: UploadState::Uploaded,
                    error: None,
                }),
                _ => Err(LoadError::Upload {
                    key,
                    source: settled
                        .error
                        .unwrap_or_else(|| Arc::new(StoreError::Other("unknown failure".into()))),
                }),
            }
        });

        try_join_all(waits).await
    }

    /// Requests cancellation of every task that has not settled. Returns how
    /// many were signalled; repeated calls are harmless.
    pub fn cancel_incomplete(&self) -> usize {
        let inner = lock(&self.inner);
        let mut cancelled = 0;
        for slot in &inner.tasks {
            if !slot.status.borrow().state.is_settled() && !slot.cancel.is_cancelled() {
                slot.cancel.cancel();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!(run_id = %self.run_id, cancelled, "Cancelled incomplete uploads");
        }
        cancelled
    }

    /// Keys of tasks that finished staging. Only these may be deleted.
    pub fn uploaded_keys(&self) -> Vec<String> {
        lock(&self.inner)
            .tasks
            .iter()
            .filter(|slot| slot.status.borrow().state == UploadState::Uploaded)
            .map(|slot| slot.key.clone())
            .collect()
    }

    pub fn tasks(&self) -> Vec<TaskHandle> {
        lock(&self.inner).tasks.iter().map(TaskSlot::handle).collect()
    }
}
