//! In-memory attachment store.
//!
//! A single mutex guards the whole state. Write transactions work on a copy of
//! the state and swap it in on commit, so an uncommitted transaction leaves no
//! trace.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use courier_core::models::{
    Attachment, AttachmentId, AttachmentPointer, AttachmentStream, MessageId, MessageRecord,
    ThreadId, ThreadRecord,
};

use crate::error::{StoreError, StoreResult};
use crate::store::{AttachmentStore, ReadTransaction, WriteTransaction};

#[derive(Debug, Clone, Default)]
struct StoreState {
    attachments: HashMap<AttachmentId, Attachment>,
    messages: HashMap<MessageId, MessageRecord>,
    threads: HashMap<ThreadId, ThreadRecord>,
    whitelist: HashSet<ThreadId>,
}

impl StoreState {
    fn messages_in_thread(&self, id: &ThreadId) -> Vec<MessageRecord> {
        self.messages
            .values()
            .filter(|message| &message.thread_id == id)
            .cloned()
            .collect()
    }
}

/// Mutex-backed store for tests and single-process tools.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Transaction("store lock poisoned".to_string()))
    }

    pub fn insert_attachment(&self, attachment: Attachment) -> StoreResult<()> {
        let mut state = self.lock()?;
        state
            .attachments
            .insert(attachment.id().clone(), attachment);
        Ok(())
    }

    /// Delete an attachment outright, as message deletion or expiry would.
    pub fn remove_attachment(&self, id: &AttachmentId) -> StoreResult<Option<Attachment>> {
        Ok(self.lock()?.attachments.remove(id))
    }

    pub fn insert_message(&self, message: MessageRecord) -> StoreResult<()> {
        self.lock()?.messages.insert(message.id.clone(), message);
        Ok(())
    }

    pub fn insert_thread(&self, thread: ThreadRecord) -> StoreResult<()> {
        self.lock()?.threads.insert(thread.id.clone(), thread);
        Ok(())
    }

    pub fn whitelist_thread(&self, id: &ThreadId) -> StoreResult<()> {
        self.lock()?.whitelist.insert(id.clone());
        Ok(())
    }

    pub fn attachment(&self, id: &AttachmentId) -> StoreResult<Option<Attachment>> {
        Ok(self.lock()?.attachments.get(id).cloned())
    }

    pub fn message(&self, id: &MessageId) -> StoreResult<Option<MessageRecord>> {
        Ok(self.lock()?.messages.get(id).cloned())
    }
}

impl AttachmentStore for MemoryStore {
    fn begin_read(&self) -> StoreResult<Box<dyn ReadTransaction + '_>> {
        Ok(Box::new(MemoryReadTransaction { state: self.lock()? }))
    }

    fn begin_write(&self) -> StoreResult<Box<dyn WriteTransaction + '_>> {
        let guard = self.lock()?;
        let working = guard.clone();
        Ok(Box::new(MemoryWriteTransaction {
            guard,
            working,
            committed: false,
        }))
    }
}

struct MemoryReadTransaction<'a> {
    state: MutexGuard<'a, StoreState>,
}

impl ReadTransaction for MemoryReadTransaction<'_> {
    fn fetch_attachment(&self, id: &AttachmentId) -> Option<Attachment> {
        self.state.attachments.get(id).cloned()
    }

    fn fetch_message(&self, id: &MessageId) -> Option<MessageRecord> {
        self.state.messages.get(id).cloned()
    }

    fn fetch_thread(&self, id: &ThreadId) -> Option<ThreadRecord> {
        self.state.threads.get(id).cloned()
    }

    fn messages_in_thread(&self, id: &ThreadId) -> Vec<MessageRecord> {
        self.state.messages_in_thread(id)
    }

    fn is_thread_whitelisted(&self, id: &ThreadId) -> bool {
        self.state.whitelist.contains(id)
    }
}

struct MemoryWriteTransaction<'a> {
    guard: MutexGuard<'a, StoreState>,
    working: StoreState,
    committed: bool,
}

impl ReadTransaction for MemoryWriteTransaction<'_> {
    fn fetch_attachment(&self, id: &AttachmentId) -> Option<Attachment> {
        self.working.attachments.get(id).cloned()
    }

    fn fetch_message(&self, id: &MessageId) -> Option<MessageRecord> {
        self.working.messages.get(id).cloned()
    }

    fn fetch_thread(&self, id: &ThreadId) -> Option<ThreadRecord> {
        self.working.threads.get(id).cloned()
    }

    fn messages_in_thread(&self, id: &ThreadId) -> Vec<MessageRecord> {
        self.working.messages_in_thread(id)
    }

    fn is_thread_whitelisted(&self, id: &ThreadId) -> bool {
        self.working.whitelist.contains(id)
    }
}

impl WriteTransaction for MemoryWriteTransaction<'_> {
    fn as_read(&self) -> &dyn ReadTransaction {
        self
    }

    fn update_pointer(
        &mut self,
        id: &AttachmentId,
        mutator: &mut dyn FnMut(&mut AttachmentPointer),
    ) -> StoreResult<bool> {
        match self.working.attachments.get_mut(id) {
            Some(Attachment::Pointer(pointer)) => {
                mutator(pointer);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn remove_pointer(&mut self, id: &AttachmentId) -> StoreResult<()> {
        match self.working.attachments.get(id) {
            Some(Attachment::Pointer(_)) => {
                self.working.attachments.remove(id);
                Ok(())
            }
            Some(Attachment::Stream(_)) => Err(StoreError::Constraint(format!(
                "attachment {} is not a pointer",
                id
            ))),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn insert_stream(&mut self, stream: AttachmentStream) -> StoreResult<()> {
        if self.working.attachments.contains_key(&stream.id) {
            return Err(StoreError::Constraint(format!(
                "attachment {} already exists",
                stream.id
            )));
        }
        self.working
            .attachments
            .insert(stream.id.clone(), Attachment::Stream(stream));
        Ok(())
    }

    fn touch_message(&mut self, id: &MessageId) {
        if let Some(message) = self.working.messages.get_mut(id) {
            message.touch_count += 1;
        }
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        let working = std::mem::take(&mut self.working);
        *self.guard = working;
        self.committed = true;
        Ok(())
    }
}

impl Drop for MemoryWriteTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!("Write transaction dropped without commit - rolling back");
        }
    }
}
