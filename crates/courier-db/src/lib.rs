//! Courier DB Library
//!
//! This crate defines the transactional store the downloader consumes, the
//! message-request policy it consults, and an in-memory store implementation.
//!
//! Transactions are synchronous and short: they are opened, used and committed
//! without awaiting in between, so callers never hold one across I/O.

pub mod error;
pub mod memory;
pub mod policy;
pub mod store;
pub mod transaction;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use policy::{MessageRequestPolicy, WhitelistPolicy};
pub use store::{AttachmentStore, ReadTransaction, WriteTransaction};
pub use transaction::{with_read, with_transaction};
