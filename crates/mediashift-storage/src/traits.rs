//! Storage abstraction traits
//!
//! This module defines the [`DestinationStore`] trait implemented by the
//! S3-compatible client and by test doubles.

use async_trait::async_trait;
use bytes::Bytes;
use mediashift_core::AppError;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid source url: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether another download attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::DownloadFailed(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ProbeFailed(msg) => AppError::ProbeFailed(msg),
            StorageError::NotFound(key) => AppError::NotFound(key),
            StorageError::InvalidEndpoint(msg) => AppError::InvalidEndpoint(msg),
            StorageError::ConfigError(msg) => AppError::Config(msg),
            other @ (StorageError::UploadFailed(_)
            | StorageError::DownloadFailed(_)
            | StorageError::PayloadTooLarge { .. }
            | StorageError::InvalidUrl(_)) => AppError::TransferFailed(other.to_string()),
        }
    }
}

/// Destination object store
///
/// Only `upload` has side effects. `exists`, `object_size` and `public_url_for`
/// are reads.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Store `data` under `key` and return the object's public URL.
    ///
    /// Payloads above the multipart threshold are sent in parts.
    async fn upload(&self, data: Bytes, key: &str, content_type: &str) -> StorageResult<String>;

    /// Metadata-only existence probe. "Not found" maps to `false`.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Size of the stored object in bytes, `None` when absent.
    async fn object_size(&self, key: &str) -> StorageResult<Option<u64>>;

    /// Public URL of `key`. Pure; fails only on a malformed endpoint.
    fn public_url_for(&self, key: &str) -> StorageResult<String>;

    fn bucket(&self) -> &str;
}
