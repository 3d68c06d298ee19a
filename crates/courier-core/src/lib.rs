//! Courier Core Library
//!
//! This crate provides the domain models, error taxonomy, configuration and the
//! attachment cipher shared by every courier crate.

pub mod config;
pub mod constants;
pub mod encryption;
pub mod error;
pub mod hooks;
pub mod models;

// Re-export commonly used types
pub use config::DownloadConfig;
pub use encryption::{AttachmentCipher, EncryptedAttachment};
pub use error::{DownloadError, DownloadResult, LogLevel};
pub use hooks::{BroadcastProgressSink, NoopProgressSink, ProgressEvent, ProgressSink};
pub use models::{
    Attachment, AttachmentId, AttachmentPointer, AttachmentStream, CdnLocator, MessageId,
    MessageRecord, PointerKind, PointerState, ThreadId, ThreadRecord,
};
