//! Caller-facing download surface.

use std::sync::Arc;

use courier_core::models::{
    Attachment, AttachmentId, AttachmentPointer, AttachmentStream, MessageId, MessageRecord,
};
use courier_core::{DownloadError, DownloadResult, ProgressSink};
use courier_db::{
    with_read, with_transaction, AttachmentStore, MessageRequestPolicy, ReadTransaction,
    WriteTransaction,
};
use courier_fetch::AttachmentFetcher;
use courier_storage::Storage;

use crate::batch::{BatchPlan, BatchTarget};
use crate::decrypt::DecryptPipeline;
use crate::gate::RequestGate;
use crate::job::{DownloadHandle, DownloadJob};
use crate::scheduler::DownloadScheduler;

/// Entry point for attachment downloads: single attachments, whole messages
/// or threads, and progress queries.
#[derive(Clone)]
pub struct AttachmentDownloads {
    store: Arc<dyn AttachmentStore>,
    scheduler: DownloadScheduler,
    gate: RequestGate,
}

/// Pointers a batch has to submit, with the message that owns each.
type Submissions = Vec<(AttachmentId, MessageId)>;

impl AttachmentDownloads {
    /// Wire the download pipeline. Must be called inside a Tokio runtime;
    /// the returned value may then be used from any thread.
    pub fn new(
        store: Arc<dyn AttachmentStore>,
        fetcher: Arc<dyn AttachmentFetcher>,
        storage: Arc<dyn Storage>,
        policy: Arc<dyn MessageRequestPolicy>,
        progress_sink: Arc<dyn ProgressSink>,
    ) -> DownloadResult<Self> {
        let scheduler = DownloadScheduler::new(
            store.clone(),
            fetcher,
            DecryptPipeline::new(storage),
            progress_sink,
        )?;
        Ok(Self {
            store,
            scheduler,
            gate: RequestGate::new(policy),
        })
    }

    pub fn scheduler(&self) -> &DownloadScheduler {
        &self.scheduler
    }

    /// Submit a download of one attachment, bypassing the message-request gate.
    ///
    /// Returns `None` when nothing was submitted: the attachment is unknown,
    /// already downloaded, or not an incoming pointer.
    pub fn enqueue_download(
        &self,
        attachment_id: &AttachmentId,
        message: Option<MessageId>,
    ) -> DownloadResult<Option<DownloadHandle>> {
        if attachment_id.is_empty() {
            return Err(DownloadError::InvalidRequest(
                "attachment id must not be empty".to_string(),
            ));
        }

        let pointer = with_read(&*self.store, |txn| txn.fetch_attachment(attachment_id))?;
        match pointer {
            Some(Attachment::Pointer(pointer)) if pointer.is_incoming() => {
                let (job, handle) = DownloadJob::new(pointer.id, message);
                self.scheduler.enqueue(job)?;
                Ok(Some(handle))
            }
            Some(Attachment::Pointer(_)) => {
                tracing::debug!(
                    attachment.id = %attachment_id,
                    "Not an incoming pointer, skipping"
                );
                Ok(None)
            }
            Some(Attachment::Stream(_)) => {
                tracing::debug!(
                    attachment.id = %attachment_id,
                    "Attachment already downloaded"
                );
                Ok(None)
            }
            None => {
                tracing::debug!(attachment.id = %attachment_id, "Attachment not found");
                Ok(None)
            }
        }
    }

    /// Download every attachment of a message or thread and wait for all of
    /// them. Already-downloaded streams are returned as they are; pointers the
    /// gate defers contribute nothing.
    #[tracing::instrument(skip(self))]
    pub async fn download_attachments(
        &self,
        target: BatchTarget,
        bypass_gate: bool,
    ) -> DownloadResult<Vec<AttachmentStream>> {
        let (ready, submissions) = with_transaction(&*self.store, |txn| {
            let messages = Self::target_messages(txn.as_read(), &target)?;
            Ok::<_, DownloadError>(self.plan_messages(txn, &messages, bypass_gate))
        })?;

        let mut plan = BatchPlan {
            ready,
            handles: Vec::with_capacity(submissions.len()),
        };
        for (attachment_id, message_id) in submissions {
            let (job, handle) = DownloadJob::new(attachment_id, Some(message_id));
            self.scheduler.enqueue(job)?;
            plan.handles.push(handle);
        }

        tracing::debug!(
            ready = plan.ready.len(),
            submitted = plan.handles.len(),
            "Batch download submitted"
        );
        plan.join(&target).await
    }

    /// Progress of an in-flight download, `None` if it is not in flight.
    pub fn current_progress(&self, attachment_id: &AttachmentId) -> Option<f64> {
        self.scheduler.progress(attachment_id)
    }

    fn target_messages(
        txn: &dyn ReadTransaction,
        target: &BatchTarget,
    ) -> DownloadResult<Vec<MessageRecord>> {
        match target {
            BatchTarget::Message(id) => txn
                .fetch_message(id)
                .map(|message| vec![message])
                .ok_or_else(|| DownloadError::InvalidRequest(format!("unknown message {}", id))),
            BatchTarget::Thread(id) => {
                if txn.fetch_thread(id).is_none() {
                    return Err(DownloadError::InvalidRequest(format!(
                        "unknown thread {}",
                        id
                    )));
                }
                Ok(txn.messages_in_thread(id))
            }
        }
    }

    /// Sort the attachments of `messages` into ready streams and pointers to
    /// submit, parking the ones the gate defers.
    fn plan_messages(
        &self,
        txn: &mut dyn WriteTransaction,
        messages: &[MessageRecord],
        bypass_gate: bool,
    ) -> (Vec<AttachmentStream>, Submissions) {
        let mut ready = Vec::new();
        let mut submissions = Vec::new();

        for message in messages {
            let thread = txn.fetch_thread(&message.thread_id);
            for attachment_id in &message.attachment_ids {
                match txn.fetch_attachment(attachment_id) {
                    Some(Attachment::Stream(stream)) => ready.push(stream),
                    Some(Attachment::Pointer(pointer)) if pointer.is_incoming() => {
                        let defer = thread.as_ref().is_some_and(|thread| {
                            self.gate.should_defer(
                                &pointer,
                                message,
                                thread,
                                txn.as_read(),
                                bypass_gate,
                            )
                        });
                        if defer {
                            self.park(txn, &pointer);
                        } else {
                            submissions.push((pointer.id, message.id.clone()));
                        }
                    }
                    Some(Attachment::Pointer(_)) => {}
                    None => {
                        tracing::debug!(attachment.id = %attachment_id, "Attachment not found")
                    }
                }
            }
        }

        (ready, submissions)
    }

    fn park(&self, txn: &mut dyn WriteTransaction, pointer: &AttachmentPointer) {
        match RequestGate::park(txn, pointer) {
            Ok(true) => tracing::info!(
                attachment.id = %pointer.id,
                "Download deferred until message request is accepted"
            ),
            Ok(false) => tracing::debug!(
                attachment.id = %pointer.id,
                state = %pointer.state,
                "Download deferred"
            ),
            Err(e) => tracing::warn!(
                attachment.id = %pointer.id,
                error = %e,
                "Failed to park deferred pointer"
            ),
        }
    }
}
