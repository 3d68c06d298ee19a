use serde::{Deserialize, Serialize};

use super::attachment::AttachmentId;

string_id!(
    /// Identity of a message. Doubles as the opaque handle the downloader
    /// uses to touch the owning message after a state change.
    MessageId
);

string_id!(
    /// Identity of a conversation thread.
    ThreadId
);

/// The fields of a message the downloader reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub is_outgoing: bool,
    pub has_sticker: bool,
    pub is_view_once: bool,
    pub attachment_ids: Vec<AttachmentId>,
    /// Bumped every time the downloader touches the message so observers re-render.
    pub touch_count: u64,
}

/// The fields of a thread the downloader reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: ThreadId,
    /// Whether the thread has been shown in the conversation list yet.
    pub is_visible: bool,
    pub has_pending_message_request: bool,
}
