//! S3-compatible destination client
//!
//! Built on `object_store`'s S3 implementation. Any store implementing
//! [`ObjectStore`] can be plugged in through [`R2Storage::with_store`], which is
//! how tests run against the in-memory backend.

use crate::traits::{DestinationStore, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use mediashift_core::constants::{
    MULTIPART_MAX_PARALLEL_PARTS, MULTIPART_PART_SIZE_BYTES, MULTIPART_THRESHOLD_BYTES,
};
use mediashift_core::DestinationConfig;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ObjectStore, ObjectStoreExt, PutPayload, WriteMultipart,
};
use reqwest::Url;
use std::sync::Arc;
use std::time::Instant;

const R2_HOST_SUFFIX: &str = ".r2.cloudflarestorage.com";

/// Public URL for `key`.
///
/// A custom public domain wins when configured. Otherwise the account id is taken
/// from an endpoint of the form `https://<account>.r2.cloudflarestorage.com` and the
/// object is addressed on the account's public development domain.
pub fn public_url(endpoint: &str, public_domain: Option<&str>, key: &str) -> StorageResult<String> {
    let key = key.trim_start_matches('/');

    if let Some(domain) = public_domain.map(str::trim).filter(|d| !d.is_empty()) {
        let base = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", domain.trim_end_matches('/'))
        };
        return Ok(format!("{}/{}", base, key));
    }

    let account = account_id(endpoint)?;
    Ok(format!("https://pub-{}.r2.dev/{}", account, key))
}

fn account_id(endpoint: &str) -> StorageResult<String> {
    let invalid = || StorageError::InvalidEndpoint(endpoint.to_string());

    let url = Url::parse(endpoint).map_err(|_| invalid())?;
    if url.scheme() != "https" || !matches!(url.path(), "" | "/") {
        return Err(invalid());
    }
    let host = url.host_str().ok_or_else(invalid)?;
    let account = host.strip_suffix(R2_HOST_SUFFIX).ok_or_else(invalid)?;
    if account.is_empty() || !account.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid());
    }
    Ok(account.to_ascii_lowercase())
}

/// Destination store for S3-compatible providers
#[derive(Clone)]
pub struct R2Storage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    endpoint: String,
    public_domain: Option<String>,
}

impl R2Storage {
    /// Connect to the bucket described by `config`.
    ///
    /// Fails with [`StorageError::InvalidEndpoint`] when no public URL can be derived,
    /// so a malformed endpoint is caught before any transfer starts.
    pub fn new(config: &DestinationConfig) -> StorageResult<Self> {
        let allow_http = config.endpoint.starts_with("http://");
        let store = AmazonS3Builder::new()
            .with_endpoint(config.endpoint.clone())
            .with_allow_http(allow_http)
            .with_region(config.region.clone())
            .with_bucket_name(config.bucket.clone())
            .with_access_key_id(config.access_key_id.clone())
            .with_secret_access_key(config.secret_access_key.clone())
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Self::with_store(
            Arc::new(store),
            config.bucket.clone(),
            config.endpoint.clone(),
            config.public_domain.clone(),
        )
    }

    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        endpoint: impl Into<String>,
        public_domain: Option<String>,
    ) -> StorageResult<Self> {
        let storage = Self {
            store,
            bucket: bucket.into(),
            endpoint: endpoint.into(),
            public_domain,
        };
        storage.public_url_for("")?;
        Ok(storage)
    }

    async fn put_single(&self, location: &Path, data: Bytes, attributes: Attributes) -> StorageResult<()> {
        self.store
            .put_opts(location, PutPayload::from(data), attributes.into())
            .await
            .map(|_| ())
            .map_err(|e| StorageError::UploadFailed(e.to_string()))
    }

    async fn put_multipart(&self, location: &Path, data: Bytes, attributes: Attributes) -> StorageResult<()> {
        let upload = self
            .store
            .put_multipart_opts(location, attributes.into())
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        let mut writer = WriteMultipart::new_with_chunk_size(upload, MULTIPART_PART_SIZE_BYTES);
        let mut offset = 0;
        while offset < data.len() {
            if let Err(e) = writer.wait_for_capacity(MULTIPART_MAX_PARALLEL_PARTS).await {
                if let Err(abort_err) = writer.abort().await {
                    tracing::warn!(
                        bucket = %self.bucket,
                        key = %location,
                        error = %abort_err,
                        "Failed to abort multipart upload"
                    );
                }
                return Err(StorageError::UploadFailed(e.to_string()));
            }
            let end = (offset + MULTIPART_PART_SIZE_BYTES).min(data.len());
            writer.put(data.slice(offset..end));
            offset = end;
        }

        writer
            .finish()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::UploadFailed(e.to_string()))
    }
}

#[async_trait]
impl DestinationStore for R2Storage {
    async fn upload(&self, data: Bytes, key: &str, content_type: &str) -> StorageResult<String> {
        let size = data.len() as u64;
        let location = Path::from(key);
        let multipart = size > MULTIPART_THRESHOLD_BYTES;

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());

        let start = Instant::now();
        let result = if multipart {
            self.put_multipart(&location, data, attributes).await
        } else {
            self.put_single(&location, data, attributes).await
        };

        if let Err(e) = &result {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                multipart,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Destination upload failed"
            );
        }
        result?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            multipart,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Destination upload successful"
        );

        self.public_url_for(key)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.object_size(key).await?.is_some())
    }

    async fn object_size(&self, key: &str) -> StorageResult<Option<u64>> {
        let location = Path::from(key);
        match self.store.head(&location).await {
            Ok(meta) => Ok(Some(meta.size)),
            Err(ObjectStoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(StorageError::ProbeFailed(e.to_string())),
        }
    }

    fn public_url_for(&self, key: &str) -> StorageResult<String> {
        public_url(&self.endpoint, self.public_domain.as_deref(), key)
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    const ENDPOINT: &str = "https://abc123.r2.cloudflarestorage.com";

    fn memory_storage(public_domain: Option<&str>) -> (Arc<InMemory>, R2Storage) {
        let memory = Arc::new(InMemory::new());
        let storage = R2Storage::with_store(
            memory.clone(),
            "media",
            ENDPOINT,
            public_domain.map(String::from),
        )
        .unwrap();
        (memory, storage)
    }

    #[test]
    fn public_url_prefers_custom_domain() {
        assert_eq!(
            public_url(ENDPOINT, Some("cdn.example"), "abc.png").unwrap(),
            "https://cdn.example/abc.png"
        );
        assert_eq!(
            public_url(ENDPOINT, Some("https://cdn.example/"), "abc.png").unwrap(),
            "https://cdn.example/abc.png"
        );
    }

    #[test]
    fn public_url_derives_account_from_endpoint() {
        assert_eq!(
            public_url(ENDPOINT, None, "abc.png").unwrap(),
            "https://pub-abc123.r2.dev/abc.png"
        );
        assert_eq!(
            public_url("https://ABC123.r2.cloudflarestorage.com/", None, "k").unwrap(),
            "https://pub-abc123.r2.dev/k"
        );
    }

    #[test]
    fn public_url_rejects_foreign_endpoints() {
        for endpoint in [
            "http://localhost:9000",
            "https://s3.amazonaws.com",
            "http://abc.r2.cloudflarestorage.com",
            "https://abc.r2.cloudflarestorage.com/bucket",
            "not a url",
        ] {
            assert!(
                matches!(
                    public_url(endpoint, None, "k"),
                    Err(StorageError::InvalidEndpoint(_))
                ),
                "{endpoint} should be rejected"
            );
        }
        // A custom domain makes the endpoint shape irrelevant.
        assert!(public_url("http://localhost:9000", Some("cdn.example"), "k").is_ok());
    }

    #[test]
    fn construction_fails_on_invalid_endpoint() {
        let result = R2Storage::with_store(Arc::new(InMemory::new()), "b", "http://minio:9000", None);
        assert!(matches!(result, Err(StorageError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn small_upload_is_single_shot_and_probed() {
        let (memory, storage) = memory_storage(Some("cdn.example"));
        assert!(!storage.exists("abc.png").await.unwrap());

        let url = storage
            .upload(Bytes::from_static(b"png bytes"), "abc.png", "image/png")
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example/abc.png");
        assert!(storage.exists("abc.png").await.unwrap());
        assert_eq!(storage.object_size("abc.png").await.unwrap(), Some(9));

        let stored = memory.get(&Path::from("abc.png")).await.unwrap();
        assert_eq!(
            stored.attributes.get(&Attribute::ContentType).map(|v| v.as_ref()),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn large_upload_goes_multipart_and_keeps_bytes() {
        let (memory, storage) = memory_storage(None);
        let size = MULTIPART_PART_SIZE_BYTES * 2 + 1234;
        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();

        let url = storage
            .upload(Bytes::from(payload.clone()), "big.mp4", "video/mp4")
            .await
            .unwrap();
        assert_eq!(url, "https://pub-abc123.r2.dev/big.mp4");

        let stored = memory
            .get(&Path::from("big.mp4"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(stored.len(), size);
        assert_eq!(stored.as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn missing_object_has_no_size() {
        let (_memory, storage) = memory_storage(None);
        assert_eq!(storage.object_size("nothing.png").await.unwrap(), None);
    }
}
