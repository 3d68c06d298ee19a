//! Store abstraction traits
//!
//! `AttachmentStore` hands out read and write transactions. Every check a
//! caller makes inside a write transaction (for example "is this still a
//! pointer?") holds until that transaction commits.

use courier_core::models::{
    Attachment, AttachmentId, AttachmentPointer, AttachmentStream, MessageId, MessageRecord,
    ThreadId, ThreadRecord,
};

use crate::error::StoreResult;

/// Read access to attachments, messages and threads.
pub trait ReadTransaction {
    fn fetch_attachment(&self, id: &AttachmentId) -> Option<Attachment>;

    fn fetch_message(&self, id: &MessageId) -> Option<MessageRecord>;

    fn fetch_thread(&self, id: &ThreadId) -> Option<ThreadRecord>;

    /// All messages of a thread, in no particular order.
    fn messages_in_thread(&self, id: &ThreadId) -> Vec<MessageRecord>;

    /// Whether the thread is on the local profile whitelist.
    fn is_thread_whitelisted(&self, id: &ThreadId) -> bool;

    /// The attachment if, and only if, it is still a pointer.
    fn fetch_pointer(&self, id: &AttachmentId) -> Option<AttachmentPointer> {
        self.fetch_attachment(id).and_then(Attachment::into_pointer)
    }
}

/// Read-write transaction. Changes become visible on [`WriteTransaction::commit`];
/// dropping the transaction discards them.
pub trait WriteTransaction: ReadTransaction {
    fn as_read(&self) -> &dyn ReadTransaction;

    /// Apply `mutator` to the pointer with `id`. Returns `false` when no pointer
    /// exists under that id (absent, or already a stream).
    fn update_pointer(
        &mut self,
        id: &AttachmentId,
        mutator: &mut dyn FnMut(&mut AttachmentPointer),
    ) -> StoreResult<bool>;

    fn remove_pointer(&mut self, id: &AttachmentId) -> StoreResult<()>;

    fn insert_stream(&mut self, stream: AttachmentStream) -> StoreResult<()>;

    /// Mark the message as changed so observers reload it. Missing messages are ignored.
    fn touch_message(&mut self, id: &MessageId);

    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Transactional attachment store.
pub trait AttachmentStore: Send + Sync {
    fn begin_read(&self) -> StoreResult<Box<dyn ReadTransaction + '_>>;

    fn begin_write(&self) -> StoreResult<Box<dyn WriteTransaction + '_>>;
}
