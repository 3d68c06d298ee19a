//! Fixed limits of the download pipeline. None of these are configurable.

/// Number of attachment downloads allowed in flight at once.
pub const MAX_CONCURRENT_DOWNLOADS: usize = 4;

/// Hard cap on the ciphertext size of a single attachment (150 MiB).
pub const MAX_DOWNLOAD_SIZE_BYTES: u64 = 150 * 1024 * 1024;

/// Smallest progress fraction reported once bytes start flowing, so a
/// progress indicator shows up immediately.
pub const PROGRESS_EPSILON: f64 = 0.001;

/// Legacy server ids below this value are a known symptom of a server bug
/// that hands out oversized blobs.
pub const SUSPICIOUS_SERVER_ID_THRESHOLD: u64 = 100;
