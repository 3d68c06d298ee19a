//! Shared key generation for storage backends.
//!
//! Key format: `attachments/{percent-encoded attachment id}.{download uuid}`.
//! The id segment never contains `.`, so the suffix is unambiguous.

use courier_core::models::AttachmentId;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use uuid::Uuid;

const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// Generate a fresh storage key for one decrypted download of `id`.
///
/// Every call returns a new key, so two downloads of the same attachment
/// never write to or delete each other's plaintext.
pub fn attachment_storage_key(id: &AttachmentId) -> String {
    format!(
        "{}.{}",
        attachment_key_prefix(id),
        Uuid::new_v4().simple()
    )
}

/// The part of every key of `id` that precedes the download suffix.
pub fn attachment_key_prefix(id: &AttachmentId) -> String {
    format!(
        "attachments/{}",
        utf8_percent_encode(id.as_str(), KEY_SEGMENT)
    )
}
