//! CDN sessions.
//!
//! One `reqwest::Client` per configured CDN number, bound to that CDN's base URL.

use std::collections::BTreeMap;
use std::time::Duration;

use courier_core::models::CdnLocator;
use courier_core::{DownloadConfig, DownloadError, DownloadResult};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Request-capable session for one CDN.
#[derive(Clone, Debug)]
pub struct CdnSession {
    client: Client,
    base_url: String,
}

impl CdnSession {
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Absolute URL of the blob `locator` points at.
    pub fn url_for(&self, locator: &CdnLocator) -> String {
        let segment = match locator {
            CdnLocator::Key(key) => utf8_percent_encode(key, PATH_SEGMENT).to_string(),
            CdnLocator::LegacyId(id) => id.to_string(),
        };
        format!("{}/attachments/{}", self.base_url, segment)
    }
}

/// Sessions keyed by CDN number.
#[derive(Clone, Debug)]
pub struct CdnClients {
    sessions: BTreeMap<u32, CdnSession>,
}

impl CdnClients {
    pub fn new(
        cdn_urls: &BTreeMap<u32, String>,
        timeout: Duration,
        user_agent: &str,
    ) -> DownloadResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| DownloadError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        let sessions = cdn_urls
            .iter()
            .map(|(cdn_number, url)| {
                (
                    *cdn_number,
                    CdnSession {
                        client: client.clone(),
                        base_url: url.trim_end_matches('/').to_string(),
                    },
                )
            })
            .collect();

        Ok(Self { sessions })
    }

    pub fn from_config(config: &DownloadConfig) -> DownloadResult<Self> {
        Self::new(
            &config.cdn_urls,
            Duration::from_secs(config.http_timeout_secs),
            &config.user_agent,
        )
    }

    pub fn session(&self, cdn_number: u32) -> DownloadResult<&CdnSession> {
        self.sessions
            .get(&cdn_number)
            .ok_or(DownloadError::UnknownCdn(cdn_number))
    }
}
