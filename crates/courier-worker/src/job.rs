//! Download jobs and their completion handles.
//!
//! A [`DownloadJob`] is owned by the scheduler while it is pending or in
//! flight. The caller keeps the matching [`DownloadHandle`] and awaits it
//! instead of registering success/failure callbacks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use courier_core::constants::PROGRESS_EPSILON;
use courier_core::models::{AttachmentId, AttachmentStream, MessageId};
use courier_core::DownloadResult;
use tokio::sync::oneshot;

/// Progress fraction of one job, shared between the fetch and progress queries.
///
/// Stored as `f64` bits. For non-negative floats the bit patterns order the
/// same way as the values, so `fetch_max` keeps the fraction monotonic.
/// Starts at the progress epsilon, so every observed value is in `[epsilon, 1]`.
#[derive(Debug)]
pub struct JobProgress {
    bits: AtomicU64,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            bits: AtomicU64::new(PROGRESS_EPSILON.to_bits()),
        }
    }
}

impl JobProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Raise the fraction to `fraction` (clamped to `[epsilon, 1]`) unless it
    /// is already higher. Returns the fraction now in effect.
    pub fn advance(&self, fraction: f64) -> f64 {
        let fraction = if fraction.is_nan() {
            PROGRESS_EPSILON
        } else {
            fraction.clamp(PROGRESS_EPSILON, 1.0)
        };
        let previous = self.bits.fetch_max(fraction.to_bits(), Ordering::AcqRel);
        f64::from_bits(previous).max(fraction)
    }
}

/// One requested download.
#[derive(Debug)]
pub struct DownloadJob {
    attachment_id: AttachmentId,
    message: Option<MessageId>,
    completion: oneshot::Sender<DownloadResult<AttachmentStream>>,
    progress: Arc<JobProgress>,
}

impl DownloadJob {
    /// Create a job for `attachment_id` and the handle its outcome is delivered to.
    /// `message` is only used to touch the owning message after state changes.
    pub fn new(attachment_id: AttachmentId, message: Option<MessageId>) -> (Self, DownloadHandle) {
        let (completion, receiver) = oneshot::channel();
        let job = Self {
            attachment_id: attachment_id.clone(),
            message,
            completion,
            progress: Arc::new(JobProgress::new()),
        };
        let handle = DownloadHandle {
            attachment_id,
            receiver,
        };
        (job, handle)
    }

    pub fn attachment_id(&self) -> &AttachmentId {
        &self.attachment_id
    }

    pub fn message(&self) -> Option<&MessageId> {
        self.message.as_ref()
    }

    pub fn progress(&self) -> &Arc<JobProgress> {
        &self.progress
    }

    pub(crate) fn complete(self, outcome: DownloadResult<AttachmentStream>) {
        if self.completion.send(outcome).is_err() {
            tracing::debug!(
                attachment.id = %self.attachment_id,
                "Download handle dropped before completion"
            );
        }
    }

    /// Drop the job without firing its continuation.
    pub(crate) fn abandon(self) {
        tracing::debug!(attachment.id = %self.attachment_id, "Download job abandoned");
    }
}

/// Caller side of a [`DownloadJob`].
#[derive(Debug)]
pub struct DownloadHandle {
    attachment_id: AttachmentId,
    receiver: oneshot::Receiver<DownloadResult<AttachmentStream>>,
}

impl DownloadHandle {
    pub fn attachment_id(&self) -> &AttachmentId {
        &self.attachment_id
    }

    /// Wait for the job to finish.
    ///
    /// `None` means the job ended without firing either continuation: it was
    /// dropped as a duplicate of an in-flight job, or it was abandoned because
    /// its pointer no longer existed.
    pub async fn outcome(self) -> Option<DownloadResult<AttachmentStream>> {
        self.receiver.await.ok()
    }
}
