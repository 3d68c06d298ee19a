use std::sync::Arc;

use courier_core::models::{
    Attachment, AttachmentId, AttachmentPointer, AttachmentStream, CdnLocator, MessageId,
    MessageRecord, PointerKind, PointerState, ThreadId, ThreadRecord,
};
use courier_core::{AttachmentCipher, BroadcastProgressSink, DownloadError};
use courier_db::{MemoryStore, WhitelistPolicy};
use courier_storage::{LocalStorage, TempFiles};
use courier_worker::AttachmentDownloads;
use tempfile::TempDir;

use super::fetcher::{FakeBlob, FakeFetcher, Hold};
use super::storage::RecordingStorage;

pub const KEY: [u8; 32] = [9; 32];

/// A downloader wired to an in-memory store, a fake CDN and local storage in
/// a scratch directory.
pub struct TestDownloads {
    pub store: Arc<MemoryStore>,
    pub fetcher: Arc<FakeFetcher>,
    pub storage: Arc<RecordingStorage>,
    pub sink: BroadcastProgressSink,
    pub downloads: AttachmentDownloads,
    pub temp: TempFiles,
    _dir: TempDir,
}

impl TestDownloads {
    /// Fetches complete immediately.
    pub async fn new() -> Self {
        Self::build(Hold::Never).await
    }

    /// Fetches report some progress, then park until [`FakeFetcher::release`]
    /// is called.
    pub async fn held() -> Self {
        Self::build(Hold::AfterProgress).await
    }

    /// Fetches park before reporting any progress.
    pub async fn held_silent() -> Self {
        Self::build(Hold::BeforeProgress).await
    }

    async fn build(hold_at: Hold) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let temp = TempFiles::new(dir.path().join("tmp")).await.unwrap();
        let local = LocalStorage::new(dir.path().join("attachments"))
            .await
            .unwrap();

        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(FakeFetcher::new(temp.clone(), hold_at));
        let storage = Arc::new(RecordingStorage::new(local));
        let sink = BroadcastProgressSink::new(256);

        let downloads = AttachmentDownloads::new(
            store.clone(),
            fetcher.clone(),
            storage.clone(),
            Arc::new(WhitelistPolicy),
            Arc::new(sink.clone()),
        )
        .unwrap();

        Self {
            store,
            fetcher,
            storage,
            sink,
            downloads,
            temp,
            _dir: dir,
        }
    }

    pub fn add_thread(&self, id: &str, is_visible: bool, has_pending_message_request: bool) {
        self.store
            .insert_thread(ThreadRecord {
                id: ThreadId::new(id),
                is_visible,
                has_pending_message_request,
            })
            .unwrap();
    }

    /// Insert an incoming message owning `attachment_ids`.
    pub fn add_message(&self, id: &str, thread: &str, attachment_ids: &[&str]) -> MessageRecord {
        let message = MessageRecord {
            id: MessageId::new(id),
            thread_id: ThreadId::new(thread),
            is_outgoing: false,
            has_sticker: false,
            is_view_once: false,
            attachment_ids: attachment_ids.iter().map(|a| AttachmentId::new(*a)).collect(),
            touch_count: 0,
        };
        self.store.insert_message(message.clone()).unwrap();
        message
    }

    pub fn replace_message(&self, message: MessageRecord) {
        self.store.insert_message(message).unwrap();
    }

    /// Insert an `Enqueued` incoming pointer whose ciphertext the fake CDN serves.
    pub fn add_pointer(
        &self,
        id: &str,
        content_type: &str,
        message: Option<&str>,
        plaintext: &[u8],
    ) -> AttachmentPointer {
        let encrypted = AttachmentCipher::encrypt(plaintext, &KEY).unwrap();
        let pointer = AttachmentPointer {
            id: AttachmentId::new(id),
            kind: PointerKind::Incoming,
            state: PointerState::Enqueued,
            cdn_number: 2,
            locator: CdnLocator::Key(format!("cdn-{}", id)),
            encryption_key: KEY.to_vec(),
            digest: encrypted.digest,
            byte_count: plaintext.len() as u64,
            content_type: content_type.to_string(),
            source_filename: None,
            message_id: message.map(MessageId::new),
        };
        self.replace_pointer(pointer.clone());
        self.fetcher
            .serve(&pointer.id, FakeBlob::Ciphertext(encrypted.ciphertext));
        pointer
    }

    /// Insert a pointer whose fetch fails with `error`.
    pub fn add_failing_pointer(
        &self,
        id: &str,
        content_type: &str,
        message: Option<&str>,
        error: DownloadError,
    ) -> AttachmentPointer {
        let pointer = self.add_pointer(id, content_type, message, b"never served");
        self.fetcher.serve(&pointer.id, FakeBlob::Fail(error));
        pointer
    }

    /// Insert a pointer whose served ciphertext has one flipped byte.
    pub fn add_corrupt_pointer(&self, id: &str, message: Option<&str>) -> AttachmentPointer {
        let plaintext = b"tampered in transit";
        let pointer = self.add_pointer(id, "image/png", message, plaintext);
        let mut encrypted = AttachmentCipher::encrypt(plaintext, &KEY).unwrap();
        encrypted.ciphertext[16] ^= 0x80;
        self.fetcher
            .serve(&pointer.id, FakeBlob::Ciphertext(encrypted.ciphertext));
        pointer
    }

    pub fn replace_pointer(&self, pointer: AttachmentPointer) {
        self.store
            .insert_attachment(Attachment::Pointer(pointer))
            .unwrap();
    }

    pub fn add_stream(&self, id: &str, message: Option<&str>) -> AttachmentStream {
        let pointer = self.add_pointer(id, "image/jpeg", message, b"already here");
        let stream = AttachmentStream::from_pointer(&pointer, format!("attachments/{}", id));
        self.store
            .insert_attachment(Attachment::Stream(stream.clone()))
            .unwrap();
        stream
    }

    pub fn attachment(&self, id: &str) -> Option<Attachment> {
        self.store.attachment(&AttachmentId::new(id)).unwrap()
    }

    pub fn pointer_state(&self, id: &str) -> Option<PointerState> {
        self.attachment(id)
            .and_then(Attachment::into_pointer)
            .map(|pointer| pointer.state)
    }

    pub fn touch_count(&self, id: &str) -> u64 {
        self.store
            .message(&MessageId::new(id))
            .unwrap()
            .map(|message| message.touch_count)
            .unwrap_or_default()
    }
}
