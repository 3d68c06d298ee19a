//! Download scheduler: pending FIFO, bounded in-flight set, and the
//! fetch → decrypt → persist drive of each admitted job.
//!
//! The pending queue and the in-flight map live behind one mutex that is only
//! held for bookkeeping. Store transactions are opened and committed without
//! awaiting in between. Each admitted job runs on its own task, spawned on the
//! runtime the scheduler was created in, and re-enters
//! [`DownloadScheduler::try_admit_next`] when it finishes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use courier_core::constants::MAX_CONCURRENT_DOWNLOADS;
use courier_core::models::{AttachmentId, AttachmentPointer, AttachmentStream, PointerState};
use courier_core::{DownloadError, DownloadResult, LogLevel, ProgressSink};
use courier_db::{with_transaction, AttachmentStore, ReadTransaction, StoreError};
use courier_fetch::{AttachmentFetcher, ProgressCallback};
use tokio::runtime::Handle;

use crate::decrypt::DecryptPipeline;
use crate::job::{DownloadJob, JobProgress};

#[derive(Default)]
struct SchedulerState {
    pending: VecDeque<DownloadJob>,
    /// Ids currently in `pending`.
    queued_ids: HashSet<AttachmentId>,
    in_flight: HashMap<AttachmentId, Arc<JobProgress>>,
}

/// Point-in-time view of the scheduler's tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub pending: Vec<AttachmentId>,
    pub in_flight: Vec<AttachmentId>,
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    store: Arc<dyn AttachmentStore>,
    fetcher: Arc<dyn AttachmentFetcher>,
    decrypt: DecryptPipeline,
    progress_sink: Arc<dyn ProgressSink>,
    runtime: Handle,
}

/// Bounded attachment download scheduler. Cloning shares the same tables.
#[derive(Clone)]
pub struct DownloadScheduler {
    inner: Arc<SchedulerInner>,
}

/// How a job left the pipeline.
enum Completion {
    Succeeded(AttachmentStream),
    Failed(DownloadError),
    Abandoned,
}

impl DownloadScheduler {
    /// Create a scheduler whose jobs run on the current Tokio runtime.
    ///
    /// Fails when called outside a runtime. Once created, the scheduler can be
    /// driven from any thread.
    pub fn new(
        store: Arc<dyn AttachmentStore>,
        fetcher: Arc<dyn AttachmentFetcher>,
        decrypt: DecryptPipeline,
        progress_sink: Arc<dyn ProgressSink>,
    ) -> DownloadResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            DownloadError::InvalidRequest(format!(
                "Download scheduler needs a Tokio runtime: {}",
                e
            ))
        })?;

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedulerState::default()),
                store,
                fetcher,
                decrypt,
                progress_sink,
                runtime,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue `job` and try to admit the head of the queue.
    ///
    /// A job whose id is already pending or in flight is dropped with a
    /// warning; its handle resolves to `None`.
    pub fn enqueue(&self, job: DownloadJob) -> DownloadResult<()> {
        if job.attachment_id().is_empty() {
            return Err(DownloadError::InvalidRequest(
                "attachment id must not be empty".to_string(),
            ));
        }

        {
            let mut state = self.state();
            let id = job.attachment_id().clone();
            if state.in_flight.contains_key(&id) || state.queued_ids.contains(&id) {
                tracing::warn!(
                    attachment.id = %id,
                    "Dropping duplicate download job"
                );
                drop(state);
                job.abandon();
                return Ok(());
            }
            state.queued_ids.insert(id.clone());
            state.pending.push_back(job);
            tracing::debug!(
                attachment.id = %id,
                pending = state.pending.len(),
                "Download job enqueued"
            );
        }

        self.try_admit_next();
        Ok(())
    }

    /// Admit the head of the pending queue if a slot is free.
    pub fn try_admit_next(&self) {
        let job = {
            let mut state = self.state();
            if state.in_flight.len() >= MAX_CONCURRENT_DOWNLOADS {
                return;
            }
            let Some(job) = state.pending.pop_front() else {
                return;
            };
            state.queued_ids.remove(job.attachment_id());

            if state.in_flight.contains_key(job.attachment_id()) {
                tracing::warn!(
                    attachment.id = %job.attachment_id(),
                    "Download already in flight, dropping duplicate job"
                );
                drop(state);
                job.abandon();
                return;
            }

            state
                .in_flight
                .insert(job.attachment_id().clone(), job.progress().clone());
            tracing::info!(
                attachment.id = %job.attachment_id(),
                in_flight = state.in_flight.len(),
                pending = state.pending.len(),
                "Download job admitted"
            );
            job
        };

        let scheduler = self.clone();
        self.inner.runtime.spawn(async move {
            scheduler.execute(job).await;
            scheduler.try_admit_next();
        });
    }

    /// Progress of the in-flight job for `id`, `None` if there is none.
    pub fn progress(&self, id: &AttachmentId) -> Option<f64> {
        self.state().in_flight.get(id).map(|progress| progress.get())
    }

    pub fn in_flight_count(&self) -> usize {
        self.state().in_flight.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.state();
        SchedulerSnapshot {
            pending: state
                .pending
                .iter()
                .map(|job| job.attachment_id().clone())
                .collect(),
            in_flight: state.in_flight.keys().cloned().collect(),
        }
    }

    #[tracing::instrument(skip(self, job), fields(attachment.id = %job.attachment_id()))]
    async fn execute(&self, job: DownloadJob) {
        let completion = match self.begin_download(&job) {
            Some(pointer) => self.download(&job, &pointer).await,
            None => Completion::Abandoned,
        };

        self.state().in_flight.remove(job.attachment_id());

        match completion {
            Completion::Succeeded(stream) => {
                tracing::info!(storage_key = %stream.storage_key, "Attachment download complete");
                job.complete(Ok(stream));
            }
            Completion::Failed(error) => job.complete(Err(error)),
            Completion::Abandoned => job.abandon(),
        }
    }

    /// Re-read the pointer and mark it `Downloading`. `None` abandons the job.
    fn begin_download(&self, job: &DownloadJob) -> Option<AttachmentPointer> {
        let id = job.attachment_id();
        let marked = with_transaction(&*self.inner.store, |txn| {
            let Some(mut pointer) = txn.fetch_pointer(id) else {
                return Ok::<_, StoreError>(None);
            };
            if !pointer.is_incoming() {
                return Ok(None);
            }

            txn.update_pointer(id, &mut |p: &mut AttachmentPointer| {
                p.state = PointerState::Downloading
            })?;
            if let Some(message) = job.message() {
                txn.touch_message(message);
            }
            pointer.state = PointerState::Downloading;
            Ok(Some(pointer))
        });

        match marked {
            Ok(Some(pointer)) => Some(pointer),
            Ok(None) => {
                tracing::debug!("No downloadable pointer left, skipping job");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to mark pointer as downloading");
                None
            }
        }
    }

    async fn download(&self, job: &DownloadJob, pointer: &AttachmentPointer) -> Completion {
        let progress = job.progress().clone();
        let sink = self.inner.progress_sink.clone();
        let id = job.attachment_id().clone();
        let on_progress: ProgressCallback = Arc::new(move |fraction| {
            let current = progress.advance(fraction);
            sink.on_progress(&id, current);
        });

        let fetched = self.inner.fetcher.fetch(pointer, on_progress).await;
        let decrypted = match fetched {
            Ok(path) => self.inner.decrypt.run(pointer, path).await,
            Err(e) => Err(e),
        };

        match decrypted {
            Ok(stream) => self.finish_success(job, stream).await,
            Err(error) => {
                self.mark_failed(job, &error);
                Completion::Failed(error)
            }
        }
    }

    /// Swap the pointer for the stream in one transaction.
    async fn finish_success(&self, job: &DownloadJob, stream: AttachmentStream) -> Completion {
        let id = job.attachment_id();
        let persisted = with_transaction(&*self.inner.store, |txn| {
            if txn.fetch_pointer(id).is_none() {
                return Ok::<_, StoreError>(false);
            }
            txn.remove_pointer(id)?;
            txn.insert_stream(stream.clone())?;
            if let Some(message) = job.message() {
                txn.touch_message(message);
            }
            Ok(true)
        });

        match persisted {
            Ok(true) => Completion::Succeeded(stream),
            Ok(false) => {
                tracing::warn!("Pointer vanished during download, discarding stored plaintext");
                self.discard_plaintext(&stream).await;
                Completion::Abandoned
            }
            Err(e) => {
                self.discard_plaintext(&stream).await;
                let error = DownloadError::from(e);
                self.mark_failed(job, &error);
                Completion::Failed(error)
            }
        }
    }

    async fn discard_plaintext(&self, stream: &AttachmentStream) {
        if let Err(e) = self.inner.decrypt.storage().delete(&stream.storage_key).await {
            tracing::warn!(
                error = %e,
                storage_key = %stream.storage_key,
                "Failed to delete orphaned attachment plaintext"
            );
        }
    }

    fn mark_failed(&self, job: &DownloadJob, error: &DownloadError) {
        let recoverable = error.is_recoverable();
        match error.log_level() {
            LogLevel::Debug => {
                tracing::debug!(error = %error, recoverable, "Attachment download failed")
            }
            LogLevel::Warn => {
                tracing::warn!(error = %error, recoverable, "Attachment download failed")
            }
            LogLevel::Error => {
                tracing::error!(error = %error, recoverable, "Attachment download failed")
            }
        }

        let id = job.attachment_id();
        let marked = with_transaction(&*self.inner.store, |txn| {
            let updated = txn.update_pointer(id, &mut |p: &mut AttachmentPointer| {
                p.state = PointerState::Failed
            })?;
            if updated {
                if let Some(message) = job.message() {
                    txn.touch_message(message);
                }
            }
            Ok::<_, StoreError>(updated)
        });

        match marked {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Pointer gone, not marking it failed"),
            Err(e) => tracing::warn!(error = %e, "Failed to mark pointer as failed"),
        }
    }
}
