//! Batch downloads for a message or a whole thread.
//!
//! Every submitted job is awaited before the batch resolves, failures
//! included. Thread batches surface whatever succeeded; message batches
//! surface the first error if any job failed.

use courier_core::models::{AttachmentStream, MessageId, ThreadId};
use courier_core::DownloadResult;
use futures::future::join_all;

use crate::job::DownloadHandle;

/// What a batch download covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchTarget {
    /// All attachments of one message. Any failure fails the batch.
    Message(MessageId),
    /// All attachments of every message in a thread. Failures are logged and
    /// the successful streams are returned.
    Thread(ThreadId),
}

impl BatchTarget {
    fn is_strict(&self) -> bool {
        matches!(self, BatchTarget::Message(_))
    }
}

/// Streams that needed no work plus the handles of submitted jobs.
#[derive(Debug, Default)]
pub(crate) struct BatchPlan {
    pub ready: Vec<AttachmentStream>,
    pub handles: Vec<DownloadHandle>,
}

impl BatchPlan {
    /// Wait for every job of the plan and aggregate the outcomes for `target`.
    pub(crate) async fn join(
        self,
        target: &BatchTarget,
    ) -> DownloadResult<Vec<AttachmentStream>> {
        let BatchPlan { mut ready, handles } = self;
        let ids: Vec<_> = handles
            .iter()
            .map(|handle| handle.attachment_id().clone())
            .collect();
        let outcomes = join_all(handles.into_iter().map(DownloadHandle::outcome)).await;

        let mut first_error = None;
        for (id, outcome) in ids.iter().zip(outcomes) {
            match outcome {
                Some(Ok(stream)) => ready.push(stream),
                Some(Err(error)) => {
                    tracing::warn!(
                        attachment.id = %id,
                        error = %error,
                        "Batch download item failed"
                    );
                    first_error.get_or_insert(error);
                }
                None => tracing::debug!(attachment.id = %id, "Batch download item abandoned"),
            }
        }

        match first_error {
            Some(error) if target.is_strict() => Err(error),
            _ => Ok(ready),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::DownloadJob;
    use courier_core::models::{
        AttachmentId, AttachmentPointer, CdnLocator, PointerKind, PointerState,
    };
    use courier_core::DownloadError;

    fn stream(id: &str) -> AttachmentStream {
        let pointer = AttachmentPointer {
            id: AttachmentId::new(id),
            kind: PointerKind::Incoming,
            state: PointerState::Downloading,
            cdn_number: 2,
            locator: CdnLocator::LegacyId(500),
            encryption_key: vec![0; 32],
            digest: vec![0; 32],
            byte_count: 3,
            content_type: "image/png".to_string(),
            source_filename: None,
            message_id: None,
        };
        AttachmentStream::from_pointer(&pointer, format!("attachments/{}", id))
    }

    fn mixed_plan() -> BatchPlan {
        let mut plan = BatchPlan {
            ready: vec![stream("done")],
            handles: Vec::new(),
        };
        for (id, outcome) in [
            ("a", Ok(stream("a"))),
            ("b", Err(DownloadError::Transport("reset".to_string()))),
            ("c", Ok(stream("c"))),
            ("d", Err(DownloadError::DownloadFailed)),
        ] {
            let (job, handle) = DownloadJob::new(AttachmentId::new(id), None);
            job.complete(outcome);
            plan.handles.push(handle);
        }
        plan
    }

    #[tokio::test]
    async fn thread_batch_returns_partial_success() {
        let streams = mixed_plan()
            .join(&BatchTarget::Thread(ThreadId::new("t")))
            .await
            .unwrap();
        let ids: Vec<_> = streams.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["done", "a", "c"]);
    }

    #[tokio::test]
    async fn message_batch_returns_first_error() {
        let result = mixed_plan()
            .join(&BatchTarget::Message(MessageId::new("m")))
            .await;
        assert_eq!(result, Err(DownloadError::Transport("reset".to_string())));
    }

    #[tokio::test]
    async fn abandoned_items_are_skipped() {
        let (job, handle) = DownloadJob::new(AttachmentId::new("gone"), None);
        job.abandon();
        let plan = BatchPlan {
            ready: Vec::new(),
            handles: vec![handle],
        };
        let streams = plan
            .join(&BatchTarget::Message(MessageId::new("m")))
            .await
            .unwrap();
        assert!(streams.is_empty());
    }
}
