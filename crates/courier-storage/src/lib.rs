//! Courier Storage Library
//!
//! This crate provides the durable storage abstraction decrypted attachments
//! are written to, its local filesystem implementation, and the temp-file
//! primitives the fetcher streams ciphertext into.
//!
//! # Storage key format
//!
//! Every attachment is stored under `attachments/{id}`, with the id
//! percent-encoded so it can never escape the storage root. Key generation is
//! centralized in the `keys` module.

pub mod factory;
pub mod keys;
pub mod local;
pub mod temp;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::{attachment_key_prefix, attachment_storage_key};
pub use local::LocalStorage;
pub use temp::{delete_if_exists, file_size, TempFile, TempFiles};
pub use traits::{Storage, StorageError, StorageResult};
