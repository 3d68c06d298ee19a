//! Message-request gate.
//!
//! Decides whether an incoming pointer should be parked in
//! `PendingMessageRequest` instead of being downloaded, because its thread
//! still carries a message request the user has not accepted.

use std::sync::Arc;

use courier_core::models::{AttachmentPointer, MessageRecord, PointerState, ThreadRecord};
use courier_db::{MessageRequestPolicy, ReadTransaction, StoreResult, WriteTransaction};

#[derive(Clone)]
pub struct RequestGate {
    policy: Arc<dyn MessageRequestPolicy>,
}

impl RequestGate {
    pub fn new(policy: Arc<dyn MessageRequestPolicy>) -> Self {
        Self { policy }
    }

    /// Whether the download of `pointer` should be deferred.
    ///
    /// Outgoing messages, stickers, view-once messages and anything that is not
    /// visual media are never deferred, nor is anything when `bypass` is set.
    pub fn should_defer(
        &self,
        pointer: &AttachmentPointer,
        message: &MessageRecord,
        thread: &ThreadRecord,
        txn: &dyn ReadTransaction,
        bypass: bool,
    ) -> bool {
        if bypass
            || message.is_outgoing
            || !pointer.is_visual_media()
            || message.has_sticker
            || message.is_view_once
        {
            return false;
        }

        self.has_pending_request(thread, txn)
    }

    fn has_pending_request(&self, thread: &ThreadRecord, txn: &dyn ReadTransaction) -> bool {
        if thread.is_visible {
            self.policy.has_pending_message_request(thread, txn)
        } else {
            !self.policy.is_thread_accepted(thread, txn)
        }
    }

    /// Park a deferred pointer. Only `Enqueued` pointers move to
    /// `PendingMessageRequest`; any other state is left alone. Returns whether
    /// the state changed.
    pub fn park(txn: &mut dyn WriteTransaction, pointer: &AttachmentPointer) -> StoreResult<bool> {
        let mut parked = false;
        txn.update_pointer(&pointer.id, &mut |p: &mut AttachmentPointer| {
            if p.state == PointerState::Enqueued {
                p.state = PointerState::PendingMessageRequest;
                parked = true;
            }
        })?;
        Ok(parked)
    }
}
