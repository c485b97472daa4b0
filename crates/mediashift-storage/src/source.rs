//! Source provider access
//!
//! The source provider is read-only and reached over plain HTTP: a HEAD probe for
//! reachability and a GET for the payload.

use crate::traits::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Result of a source reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceProbe {
    /// The provider answered with a not-found class status.
    Missing { status: u16 },
    /// The object is reachable; the size is known when the provider declared it.
    Available { content_length: Option<u64> },
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn probe(&self, url: &str) -> StorageResult<SourceProbe>;

    /// Download the whole payload, failing once more than `max_bytes` arrive.
    async fn fetch(&self, url: &str, max_bytes: u64) -> StorageResult<Bytes>;
}

/// Turn a record url into an absolute one.
///
/// Absolute urls pass through, protocol-relative urls get `https:`, and
/// root-relative paths are joined onto `base_url`.
pub fn resolve_source_url(url: &str, base_url: Option<&str>) -> StorageResult<String> {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(url.to_string());
    }
    if let Some(rest) = url.strip_prefix("//") {
        return Ok(format!("https://{}", rest));
    }
    match base_url.map(str::trim).filter(|b| !b.is_empty()) {
        Some(base) if !url.is_empty() => Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            url.trim_start_matches('/')
        )),
        _ => Err(StorageError::InvalidUrl(url.to_string())),
    }
}

fn is_missing(status: StatusCode) -> bool {
    matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE)
}

/// HTTP source with separate probe and download timeouts.
#[derive(Clone)]
pub struct HttpSource {
    client: Client,
    probe_timeout: Duration,
    download_timeout: Duration,
}

impl HttpSource {
    pub fn new(probe_timeout: Duration, download_timeout: Duration) -> StorageResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            probe_timeout,
            download_timeout,
        })
    }
}

#[async_trait]
impl SourceFetcher for HttpSource {
    async fn probe(&self, url: &str) -> StorageResult<SourceProbe> {
        let response = self
            .client
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| StorageError::ProbeFailed(format!("{}: {}", url, e)))?;

        let status = response.status();
        if is_missing(status) {
            return Ok(SourceProbe::Missing {
                status: status.as_u16(),
            });
        }
        // Some providers refuse HEAD; the download decides for those.
        if matches!(
            status,
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        ) {
            return Ok(SourceProbe::Available {
                content_length: None,
            });
        }
        if !status.is_success() {
            return Err(StorageError::ProbeFailed(format!(
                "{} returned status code: {}",
                url, status
            )));
        }

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        Ok(SourceProbe::Available { content_length })
    }

    async fn fetch(&self, url: &str, max_bytes: u64) -> StorageResult<Bytes> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, url = %url, "Failed to download from source");
                StorageError::DownloadFailed(e.to_string())
            })?;

        let status = response.status();
        if is_missing(status) {
            return Err(StorageError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(StorageError::DownloadFailed(format!(
                "URL returned status code: {}",
                status
            )));
        }

        if let Some(declared) = response.content_length() {
            if declared > max_bytes {
                return Err(StorageError::PayloadTooLarge {
                    size: declared,
                    limit: max_bytes,
                });
            }
        }

        let mut buffer = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| StorageError::DownloadFailed(format!("Failed to read response body: {}", e)))?
        {
            let received = (buffer.len() + chunk.len()) as u64;
            if received > max_bytes {
                return Err(StorageError::PayloadTooLarge {
                    size: received,
                    limit: max_bytes,
                });
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer.freeze())
    }
}
