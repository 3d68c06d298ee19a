//! Courier Fetch Library
//!
//! Streams attachment ciphertext from a CDN into a temp file while enforcing
//! the hard size cap. See [`SizeGuardedFetcher`].

pub mod cdn;
pub mod fetcher;

pub use cdn::{CdnClients, CdnSession};
pub use fetcher::{AttachmentFetcher, ProgressCallback, SizeGuardedFetcher};
