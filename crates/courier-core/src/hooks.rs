//! Progress sink hook.
//!
//! The scheduler owns an `Arc<dyn ProgressSink>` and broadcasts fractional
//! progress keyed by attachment id. Delivery is fire-and-forget: a sink must
//! never block the fetch that reports to it.

use tokio::sync::broadcast;

use crate::models::AttachmentId;

/// One progress tick for an in-flight download.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub attachment_id: AttachmentId,
    /// Fraction in `[0, 1]`.
    pub fraction: f64,
}

/// Receiver of download progress.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, attachment_id: &AttachmentId, fraction: f64);
}

/// Sink that drops every event.
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_progress(&self, _attachment_id: &AttachmentId, _fraction: f64) {}
}

/// Sink that fans events out over a tokio broadcast channel.
///
/// Lagging or absent subscribers lose events; the sender never waits.
#[derive(Clone)]
pub struct BroadcastProgressSink {
    sender: broadcast::Sender<ProgressEvent>,
}

impl BroadcastProgressSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl ProgressSink for BroadcastProgressSink {
    fn on_progress(&self, attachment_id: &AttachmentId, fraction: f64) {
        let _ = self.sender.send(ProgressEvent {
            attachment_id: attachment_id.clone(),
            fraction,
        });
    }
}
