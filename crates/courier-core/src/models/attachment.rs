use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::message::MessageId;

string_id!(
    /// Logical attachment identity, shared by a pointer and the stream that replaces it.
    AttachmentId
);

/// Download state of a pointer.
///
/// Successful downloads never reach a terminal pointer state: the pointer row is
/// replaced by an [`AttachmentStream`] under the same [`AttachmentId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerState {
    Enqueued,
    PendingMessageRequest,
    Downloading,
    Failed,
}

impl Display for PointerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PointerState::Enqueued => write!(f, "enqueued"),
            PointerState::PendingMessageRequest => write!(f, "pending_message_request"),
            PointerState::Downloading => write!(f, "downloading"),
            PointerState::Failed => write!(f, "failed"),
        }
    }
}

/// Where a pointer came from. Only incoming pointers are ever downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    Incoming,
    Restoring,
}

/// Transport locator of the ciphertext blob on its CDN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CdnLocator {
    /// Opaque CDN key (percent-encoded when placed in the URL path).
    Key(String),
    /// Numeric server id used by the legacy CDN.
    LegacyId(u64),
}

/// Remote-only attachment metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentPointer {
    pub id: AttachmentId,
    pub kind: PointerKind,
    pub state: PointerState,
    pub cdn_number: u32,
    pub locator: CdnLocator,
    pub encryption_key: Vec<u8>,
    pub digest: Vec<u8>,
    /// Declared unpadded plaintext size.
    pub byte_count: u64,
    pub content_type: String,
    pub source_filename: Option<String>,
    pub message_id: Option<MessageId>,
}

impl AttachmentPointer {
    pub fn is_incoming(&self) -> bool {
        self.kind == PointerKind::Incoming
    }

    pub fn is_visual_media(&self) -> bool {
        is_visual_media(&self.content_type)
    }

    pub fn legacy_server_id(&self) -> Option<u64> {
        match self.locator {
            CdnLocator::LegacyId(id) => Some(id),
            CdnLocator::Key(_) => None,
        }
    }
}

/// A downloaded, decrypted attachment backed by a file in durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentStream {
    pub id: AttachmentId,
    pub content_type: String,
    pub source_filename: Option<String>,
    pub byte_count: u64,
    pub digest: Vec<u8>,
    pub storage_key: String,
    pub message_id: Option<MessageId>,
    pub downloaded_at: DateTime<Utc>,
}

impl AttachmentStream {
    /// Build the stream that will replace `pointer` once its plaintext is stored
    /// under `storage_key`.
    pub fn from_pointer(pointer: &AttachmentPointer, storage_key: String) -> Self {
        Self {
            id: pointer.id.clone(),
            content_type: pointer.content_type.clone(),
            source_filename: pointer.source_filename.clone(),
            byte_count: pointer.byte_count,
            digest: pointer.digest.clone(),
            storage_key,
            message_id: pointer.message_id.clone(),
            downloaded_at: Utc::now(),
        }
    }
}

/// An attachment record as persisted: either still remote or already local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Attachment {
    Pointer(AttachmentPointer),
    Stream(AttachmentStream),
}

impl Attachment {
    pub fn id(&self) -> &AttachmentId {
        match self {
            Attachment::Pointer(pointer) => &pointer.id,
            Attachment::Stream(stream) => &stream.id,
        }
    }

    pub fn as_pointer(&self) -> Option<&AttachmentPointer> {
        match self {
            Attachment::Pointer(pointer) => Some(pointer),
            Attachment::Stream(_) => None,
        }
    }

    pub fn into_pointer(self) -> Option<AttachmentPointer> {
        match self {
            Attachment::Pointer(pointer) => Some(pointer),
            Attachment::Stream(_) => None,
        }
    }

    pub fn as_stream(&self) -> Option<&AttachmentStream> {
        match self {
            Attachment::Stream(stream) => Some(stream),
            Attachment::Pointer(_) => None,
        }
    }
}

/// Images (animated ones included) and videos.
pub fn is_visual_media(content_type: &str) -> bool {
    let content_type = content_type.trim().to_ascii_lowercase();
    content_type.starts_with("image/") || content_type.starts_with("video/")
}
