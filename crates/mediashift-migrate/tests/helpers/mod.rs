//! Test doubles for the migration engine.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use mediashift_core::{MigrationSettings, ProgressEvent, RecordOutcome, Reporter};
use mediashift_db::testing::setup_sqlite;
use mediashift_db::AssetRepository;
use mediashift_storage::{
    DestinationStore, SourceFetcher, SourceProbe, StorageError, StorageResult,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CDN: &str = "https://cdn.example";

/// Source provider backed by a map of url -> payload.
#[derive(Default)]
pub struct MockSource {
    objects: Mutex<HashMap<String, Bytes>>,
    missing: Mutex<HashSet<String>>,
    failures_left: Mutex<HashMap<String, usize>>,
    hidden_length: Mutex<HashSet<String>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl MockSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: &'static [u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(url.to_string(), Bytes::from_static(body));
    }

    pub fn mark_missing(&self, url: &str) {
        self.missing.lock().unwrap().insert(url.to_string());
    }

    /// Make the next `times` fetches of `url` fail with a retryable error.
    pub fn fail_fetches(&self, url: &str, times: usize) {
        self.failures_left
            .lock()
            .unwrap()
            .insert(url.to_string(), times);
    }

    /// Probe answers without a Content-Length for `url`.
    pub fn hide_length(&self, url: &str) {
        self.hidden_length.lock().unwrap().insert(url.to_string());
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl SourceFetcher for MockSource {
    async fn probe(&self, url: &str) -> StorageResult<SourceProbe> {
        if self.missing.lock().unwrap().contains(url) {
            return Ok(SourceProbe::Missing { status: 404 });
        }
        let objects = self.objects.lock().unwrap();
        match objects.get(url) {
            Some(body) => {
                let content_length = if self.hidden_length.lock().unwrap().contains(url) {
                    None
                } else {
                    Some(body.len() as u64)
                };
                Ok(SourceProbe::Available { content_length })
            }
            None => Err(StorageError::ProbeFailed(format!("{} unreachable", url))),
        }
    }

    async fn fetch(&self, url: &str, max_bytes: u64) -> StorageResult<Bytes> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        {
            let mut failures = self.failures_left.lock().unwrap();
            if let Some(left) = failures.get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(StorageError::DownloadFailed("connection reset".to_string()));
                }
            }
        }

        let body = self
            .objects
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(url.to_string()))?;
        if body.len() as u64 > max_bytes {
            return Err(StorageError::PayloadTooLarge {
                size: body.len() as u64,
                limit: max_bytes,
            });
        }
        Ok(body)
    }
}

/// Destination that keeps objects in memory and counts uploads.
#[derive(Default)]
pub struct MemoryDestination {
    objects: Mutex<HashMap<String, Bytes>>,
    uploads: Mutex<Vec<String>>,
    fail_uploads: Mutex<bool>,
}

impl MemoryDestination {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, key: &str, body: &'static [u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from_static(body));
    }

    pub fn fail_uploads(&self) {
        *self.fail_uploads.lock().unwrap() = true;
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl DestinationStore for MemoryDestination {
    async fn upload(&self, data: Bytes, key: &str, _content_type: &str) -> StorageResult<String> {
        if *self.fail_uploads.lock().unwrap() {
            return Err(StorageError::UploadFailed("destination refused".to_string()));
        }
        self.objects.lock().unwrap().insert(key.to_string(), data);
        self.uploads.lock().unwrap().push(key.to_string());
        self.public_url_for(key)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn object_size(&self, key: &str) -> StorageResult<Option<u64>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .map(|b| b.len() as u64))
    }

    fn public_url_for(&self, key: &str) -> StorageResult<String> {
        Ok(format!("{}/{}", CDN, key))
    }

    fn bucket(&self) -> &str {
        "media"
    }
}

/// Reporter that keeps every finished record's outcome.
#[derive(Default)]
pub struct RecordingReporter {
    outcomes: Mutex<Vec<(i64, RecordOutcome)>>,
    warnings: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Outcomes sorted by record id.
    pub fn outcomes(&self) -> Vec<(i64, RecordOutcome)> {
        let mut outcomes = self.outcomes.lock().unwrap().clone();
        outcomes.sort_by_key(|(id, _)| *id);
        outcomes
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: ProgressEvent<'_>) {
        match event {
            ProgressEvent::RecordFinished { id, outcome, .. } => {
                self.outcomes.lock().unwrap().push((id, outcome.clone()));
            }
            ProgressEvent::Warning { message } => {
                self.warnings.lock().unwrap().push(message.to_string());
            }
            _ => {}
        }
    }
}

pub fn settings(dir: &Path) -> MigrationSettings {
    MigrationSettings {
        state_file: dir.join("migration-state.json"),
        retry_base_delay: Duration::from_millis(1),
        ..MigrationSettings::default()
    }
}

pub async fn repository(dir: &Path) -> AssetRepository {
    setup_sqlite(dir).await
}
