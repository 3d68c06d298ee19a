//! Courier Worker Library
//!
//! Turns attachment pointers into attachment streams. The [`DownloadScheduler`]
//! admits at most four jobs at a time and drives each through fetch, decrypt
//! and persist; the [`DecryptPipeline`] serializes decryption across all of
//! them. [`AttachmentDownloads`] is the surface callers use.

pub mod batch;
pub mod decrypt;
pub mod downloads;
pub mod gate;
pub mod job;
pub mod scheduler;

pub use batch::BatchTarget;
pub use decrypt::DecryptPipeline;
pub use downloads::AttachmentDownloads;
pub use gate::RequestGate;
pub use job::{DownloadHandle, DownloadJob, JobProgress};
pub use scheduler::{DownloadScheduler, SchedulerSnapshot};
