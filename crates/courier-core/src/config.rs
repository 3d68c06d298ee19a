//! Configuration module
//!
//! `DownloadConfig` carries the deployment-specific settings of the downloader:
//! CDN base URLs, scratch and storage directories, and HTTP client knobs.
//! Concurrency limit and size cap are fixed constants (see [`crate::constants`]).

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

const HTTP_TIMEOUT_SECS: u64 = 300;
const CDN_NUMBERS: [u32; 3] = [0, 2, 3];

/// Downloader configuration.
#[derive(Clone, Debug)]
pub struct DownloadConfig {
    /// Base URL per CDN number.
    pub cdn_urls: BTreeMap<u32, String>,
    /// Directory for in-progress ciphertext files.
    pub temp_dir: PathBuf,
    /// Root directory of durable plaintext storage.
    pub storage_path: PathBuf,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub environment: String,
}

impl DownloadConfig {
    /// Load configuration from the environment (and `.env`, if present).
    ///
    /// CDN URLs come from `COURIER_CDN{n}_URL` for n in 0, 2, 3.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let cdn_urls = CDN_NUMBERS
            .iter()
            .filter_map(|n| {
                env::var(format!("COURIER_CDN{}_URL", n))
                    .ok()
                    .map(|url| (*n, url.trim().to_string()))
            })
            .filter(|(_, url)| !url.is_empty())
            .collect();

        let config = DownloadConfig {
            cdn_urls,
            temp_dir: env::var("COURIER_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("courier")),
            storage_path: env::var("COURIER_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./attachments")),
            http_timeout_secs: env::var("COURIER_HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| HTTP_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(HTTP_TIMEOUT_SECS),
            user_agent: env::var("COURIER_USER_AGENT")
                .unwrap_or_else(|_| format!("courier/{}", env!("CARGO_PKG_VERSION"))),
            environment: env::var("ENVIRONMENT")
                .or_else(|_| env::var("APP_ENV"))
                .unwrap_or_else(|_| "development".to_string()),
        };

        config.validate()?;
        tracing::debug!(
            cdns = ?config.cdn_urls.keys().collect::<Vec<_>>(),
            environment = %config.environment,
            "Download configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.cdn_urls.is_empty() {
            return Err(anyhow::anyhow!(
                "At least one of COURIER_CDN0_URL, COURIER_CDN2_URL, COURIER_CDN3_URL must be set"
            ));
        }

        for (cdn_number, url) in &self.cdn_urls {
            let lower = url.to_lowercase();
            if !(lower.starts_with("https://") || lower.starts_with("http://")) {
                return Err(anyhow::anyhow!(
                    "COURIER_CDN{}_URL must be an http(s) URL, got {}",
                    cdn_number,
                    url
                ));
            }
        }

        if self.http_timeout_secs == 0 {
            return Err(anyhow::anyhow!("COURIER_HTTP_TIMEOUT_SECS must be positive"));
        }

        Ok(())
    }
}
