//! Size-guarded attachment fetcher.
//!
//! Streams one ciphertext blob from its CDN into a temp file. The transfer is
//! aborted as soon as the declared `Content-Length` or the bytes received so
//! far exceed the cap, and the finished file is measured again before it is
//! handed off. Every failure path deletes the temp file; on success the
//! caller owns it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::constants::{
    MAX_DOWNLOAD_SIZE_BYTES, PROGRESS_EPSILON, SUSPICIOUS_SERVER_ID_THRESHOLD,
};
use courier_core::models::AttachmentPointer;
use courier_core::{DownloadError, DownloadResult};
use courier_storage::{file_size, StorageError, TempFiles};
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH};
use reqwest::StatusCode;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::cdn::{CdnClients, CdnSession};

/// Receives the download fraction of the transfer in progress.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Fetches a pointer's ciphertext into a local file.
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    /// Download the blob `pointer` refers to and return the path of the
    /// ciphertext file. The caller is responsible for deleting it.
    async fn fetch(
        &self,
        pointer: &AttachmentPointer,
        on_progress: ProgressCallback,
    ) -> DownloadResult<PathBuf>;
}

/// Failure modes of a single transfer, before they are collapsed into
/// [`DownloadError`].
#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("invalid response headers: {0}")]
    InvalidHeaders(String),

    #[error("size limit exceeded: {bytes} bytes")]
    SizeLimitExceeded { bytes: u64 },

    #[error("unexpected destination {0}")]
    InvalidDestination(String),

    #[error("downloaded file missing")]
    MissingFile,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    fn into_download_error(self, pointer: &AttachmentPointer) -> DownloadError {
        match self {
            FetchError::Transport(e) => DownloadError::Transport(e.to_string()),
            FetchError::Status(status) => {
                DownloadError::Transport(format!("unexpected status {}", status))
            }
            FetchError::SizeLimitExceeded { bytes } => {
                match pointer.legacy_server_id() {
                    Some(server_id) if server_id < SUSPICIOUS_SERVER_ID_THRESHOLD => {
                        tracing::error!(
                            server_id,
                            bytes,
                            "Attachment exceeded size limit with suspiciously low server id"
                        );
                    }
                    _ => tracing::error!(bytes, "Attachment exceeded size limit, aborting"),
                }
                DownloadError::DownloadFailed
            }
            FetchError::InvalidHeaders(reason) => {
                tracing::error!(reason = %reason, "Attachment response rejected");
                DownloadError::DownloadFailed
            }
            FetchError::InvalidDestination(path) => {
                tracing::error!(path = %path, "Attachment downloaded to unexpected path");
                DownloadError::DownloadFailed
            }
            FetchError::MissingFile => {
                tracing::error!("Downloaded attachment file is missing");
                DownloadError::DownloadFailed
            }
            FetchError::Io(e) => DownloadError::Storage(format!("IO error: {}", e)),
        }
    }
}

/// Streaming fetcher that enforces the attachment size cap.
#[derive(Clone)]
pub struct SizeGuardedFetcher {
    cdn: CdnClients,
    temp: TempFiles,
    max_bytes: u64,
}

impl SizeGuardedFetcher {
    pub fn new(cdn: CdnClients, temp: TempFiles) -> Self {
        Self {
            cdn,
            temp,
            max_bytes: MAX_DOWNLOAD_SIZE_BYTES,
        }
    }

    /// Lower the size cap. The cap can never be raised above
    /// [`MAX_DOWNLOAD_SIZE_BYTES`].
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes.min(MAX_DOWNLOAD_SIZE_BYTES);
        self
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    async fn stream_to_file(
        &self,
        session: &CdnSession,
        url: &str,
        destination: &Path,
        on_progress: &ProgressCallback,
    ) -> Result<(), FetchError> {
        if !self.temp.owns(destination) {
            return Err(FetchError::InvalidDestination(
                destination.display().to_string(),
            ));
        }

        let response = session.client().get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let declared = validate_content_length(response.headers(), self.max_bytes)?;

        let mut file = fs::File::create(destination).await?;
        let mut received: u64 = 0;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            received += chunk.len() as u64;
            if received > self.max_bytes {
                return Err(FetchError::SizeLimitExceeded { bytes: received });
            }

            file.write_all(&chunk).await?;
            on_progress(progress_fraction(received, declared));
        }

        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl AttachmentFetcher for SizeGuardedFetcher {
    #[tracing::instrument(
        skip(self, pointer, on_progress),
        fields(attachment.id = %pointer.id, cdn = pointer.cdn_number)
    )]
    async fn fetch(
        &self,
        pointer: &AttachmentPointer,
        on_progress: ProgressCallback,
    ) -> DownloadResult<PathBuf> {
        let session = self.cdn.session(pointer.cdn_number)?;
        let url = session.url_for(&pointer.locator);
        let temp_file = self.temp.allocate();

        let transferred = self
            .stream_to_file(session, &url, temp_file.path(), &on_progress)
            .await;
        if let Err(e) = transferred {
            return Err(e.into_download_error(pointer));
        }

        let size = verify_downloaded_file(temp_file.path(), self.max_bytes)
            .await
            .map_err(|e| e.into_download_error(pointer))?;

        tracing::debug!(size_bytes = size, "Attachment ciphertext downloaded");
        Ok(temp_file.into_path())
    }
}

/// Parse and bound-check `Content-Length`. Missing, malformed or oversize
/// values are all rejected.
fn validate_content_length(headers: &HeaderMap, max_bytes: u64) -> Result<u64, FetchError> {
    let value = headers
        .get(CONTENT_LENGTH)
        .ok_or_else(|| FetchError::InvalidHeaders("missing Content-Length".to_string()))?;

    let declared: u64 = value
        .to_str()
        .map_err(|_| FetchError::InvalidHeaders("non-ascii Content-Length".to_string()))?
        .trim()
        .parse()
        .map_err(|_| FetchError::InvalidHeaders("non-numeric Content-Length".to_string()))?;

    if declared > max_bytes {
        return Err(FetchError::SizeLimitExceeded { bytes: declared });
    }

    Ok(declared)
}

/// Measure the finished file again; the transfer may have written more than
/// the headers promised.
async fn verify_downloaded_file(path: &Path, max_bytes: u64) -> Result<u64, FetchError> {
    let size = file_size(path).await.map_err(|e| match e {
        StorageError::NotFound(_) => FetchError::MissingFile,
        StorageError::IoError(e) => FetchError::Io(e),
        other => FetchError::Io(std::io::Error::other(other.to_string())),
    })?;

    if size > max_bytes {
        return Err(FetchError::SizeLimitExceeded { bytes: size });
    }

    Ok(size)
}

fn progress_fraction(received: u64, declared: u64) -> f64 {
    if declared == 0 {
        return 1.0;
    }
    (received as f64 / declared as f64).clamp(PROGRESS_EPSILON, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::models::{AttachmentId, CdnLocator, PointerKind, PointerState};
    use reqwest::header::HeaderValue;
    use std::collections::BTreeMap;
    use std::io::Write as _;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    fn pointer(locator: CdnLocator) -> AttachmentPointer {
        AttachmentPointer {
            id: AttachmentId::new("att-1"),
            kind: PointerKind::Incoming,
            state: PointerState::Downloading,
            cdn_number: 2,
            locator,
            encryption_key: vec![0; 32],
            digest: vec![0; 32],
            byte_count: 10,
            content_type: "image/jpeg".to_string(),
            source_filename: None,
            message_id: None,
        }
    }

    async fn fetcher(base_url: &str, temp_dir: &Path) -> SizeGuardedFetcher {
        let urls = BTreeMap::from([(2, base_url.to_string())]);
        let cdn = CdnClients::new(&urls, Duration::from_secs(5), "courier-test").unwrap();
        let temp = TempFiles::new(temp_dir).await.unwrap();
        SizeGuardedFetcher::new(cdn, temp)
    }

    fn recording_progress() -> (ProgressCallback, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |fraction| {
            sink.lock().unwrap().push(fraction);
        });
        (callback, seen)
    }

    fn temp_dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn downloads_body_to_temp_file() {
        let mut server = mockito::Server::new_async().await;
        let body = vec![42u8; 64 * 1024];
        let mock = server
            .mock("GET", "/attachments/abc")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let fetcher = fetcher(&server.url(), dir.path()).await;
        let (callback, seen) = recording_progress();

        let path = fetcher
            .fetch(&pointer(CdnLocator::Key("abc".to_string())), callback)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(std::fs::read(&path).unwrap(), body);

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen
            .iter()
            .all(|f| (PROGRESS_EPSILON..=1.0).contains(f)));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 1.0);
    }

    #[tokio::test]
    async fn oversize_content_length_aborts_and_cleans_up() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/attachments/big")
            .with_status(200)
            .with_body(vec![0u8; 4096])
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let fetcher = fetcher(&server.url(), dir.path())
            .await
            .with_max_bytes(1024);
        let (callback, seen) = recording_progress();

        let result = fetcher
            .fetch(&pointer(CdnLocator::Key("big".to_string())), callback)
            .await;

        assert_eq!(result.unwrap_err(), DownloadError::DownloadFailed);
        assert!(seen.lock().unwrap().is_empty());
        assert!(temp_dir_is_empty(dir.path()));
    }

    /// Log sink for asserting on what the fetcher reports.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Fetch an oversize blob at `locator` and return what was logged.
    async fn oversize_fetch_logs(locator: CdnLocator, path: &str) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", path)
            .with_status(200)
            .with_body(vec![0u8; 4096])
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let fetcher = fetcher(&server.url(), dir.path())
            .await
            .with_max_bytes(1024);
        let (callback, _) = recording_progress();

        let result = fetcher.fetch(&pointer(locator), callback).await;

        assert_eq!(result.unwrap_err(), DownloadError::DownloadFailed);
        assert!(temp_dir_is_empty(dir.path()));
        let logged = logs.0.lock().unwrap().clone();
        String::from_utf8(logged).unwrap()
    }

    #[tokio::test]
    async fn oversize_blob_with_low_legacy_id_is_flagged() {
        let logs = oversize_fetch_logs(CdnLocator::LegacyId(5), "/attachments/5").await;

        assert!(logs.contains("suspiciously low server id"));
        assert!(logs.contains("server_id=5"));
    }

    #[tokio::test]
    async fn oversize_blob_with_ordinary_id_is_not_flagged() {
        let logs = oversize_fetch_logs(CdnLocator::LegacyId(500), "/attachments/500").await;

        assert!(logs.contains("Attachment exceeded size limit, aborting"));
        assert!(!logs.contains("suspiciously"));
    }

    #[tokio::test]
    async fn missing_content_length_aborts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/attachments/chunked")
            .with_status(200)
            .with_chunked_body(|w| w.write_all(b"no length header here"))
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let fetcher = fetcher(&server.url(), dir.path()).await;
        let (callback, _) = recording_progress();

        let result = fetcher
            .fetch(&pointer(CdnLocator::Key("chunked".to_string())), callback)
            .await;

        assert_eq!(result.unwrap_err(), DownloadError::DownloadFailed);
        assert!(temp_dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn error_status_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/attachments/77")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let fetcher = fetcher(&server.url(), dir.path()).await;
        let (callback, _) = recording_progress();

        let result = fetcher
            .fetch(&pointer(CdnLocator::LegacyId(77)), callback)
            .await;

        assert!(matches!(result, Err(DownloadError::Transport(_))));
        assert!(temp_dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn unknown_cdn_is_rejected_before_any_request() {
        let dir = tempdir().unwrap();
        let fetcher = fetcher("http://127.0.0.1:9", dir.path()).await;
        let (callback, _) = recording_progress();

        let mut pointer = pointer(CdnLocator::LegacyId(1));
        pointer.cdn_number = 3;

        let result = fetcher.fetch(&pointer, callback).await;
        assert_eq!(result.unwrap_err(), DownloadError::UnknownCdn(3));
    }

    #[test]
    fn content_length_validation() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            validate_content_length(&headers, MAX_DOWNLOAD_SIZE_BYTES),
            Err(FetchError::InvalidHeaders(_))
        ));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("abc"));
        assert!(matches!(
            validate_content_length(&headers, MAX_DOWNLOAD_SIZE_BYTES),
            Err(FetchError::InvalidHeaders(_))
        ));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("200000000"));
        assert!(matches!(
            validate_content_length(&headers, MAX_DOWNLOAD_SIZE_BYTES),
            Err(FetchError::SizeLimitExceeded { bytes: 200_000_000 })
        ));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1048576"));
        assert_eq!(
            validate_content_length(&headers, MAX_DOWNLOAD_SIZE_BYTES).unwrap(),
            1_048_576
        );
    }

    #[tokio::test]
    async fn oversize_file_rejected_after_download() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sparse.download");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(MAX_DOWNLOAD_SIZE_BYTES + 1).unwrap();

        assert!(matches!(
            verify_downloaded_file(&path, MAX_DOWNLOAD_SIZE_BYTES).await,
            Err(FetchError::SizeLimitExceeded { .. })
        ));

        file.set_len(MAX_DOWNLOAD_SIZE_BYTES).unwrap();
        assert_eq!(
            verify_downloaded_file(&path, MAX_DOWNLOAD_SIZE_BYTES)
                .await
                .unwrap(),
            MAX_DOWNLOAD_SIZE_BYTES
        );
    }

    #[tokio::test]
    async fn missing_file_rejected() {
        let dir = tempdir().unwrap();
        let result = verify_downloaded_file(&dir.path().join("nope"), 10).await;
        assert!(matches!(result, Err(FetchError::MissingFile)));
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress_fraction(1, 1_000_000), PROGRESS_EPSILON);
        assert_eq!(progress_fraction(500, 1000), 0.5);
        assert_eq!(progress_fraction(2000, 1000), 1.0);
    }

    #[tokio::test]
    async fn cap_cannot_be_raised() {
        let urls = BTreeMap::new();
        let cdn = CdnClients::new(&urls, Duration::from_secs(1), "t").unwrap();
        let dir = tempdir().unwrap();
        let temp = TempFiles::new(dir.path()).await.unwrap();
        let fetcher = SizeGuardedFetcher::new(cdn, temp).with_max_bytes(u64::MAX);
        assert_eq!(fetcher.max_bytes(), MAX_DOWNLOAD_SIZE_BYTES);
    }
}
