//! Migration engine
//!
//! Per record: probe the source, derive the content-addressed key, reuse or
//! transfer the object, then rewrite the row. The transfer and the rewrite share
//! one transaction, so a row never points at bytes that were not uploaded.
//!
//! Records are spread over a fixed number of workers. Each finished record is
//! written to the ledger under a lock before its worker picks up the next one.

use bytes::Bytes;
use chrono::Utc;
use mediashift_core::constants::DRY_RUN_URL_PREFIX;
use mediashift_core::{
    AppError, AssetRecord, FormatVariant, MigrationSettings, NoOpReporter, ProgressEvent,
    RecordOutcome, Reporter, RunStatus, RunSummary,
};
use mediashift_db::{AssetRepository, AssetRewrite, DbTransaction};
use mediashift_storage::{
    asset_key, resolve_source_url, DestinationStore, SourceFetcher, SourceProbe, StorageError,
};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

use crate::state::{MigrationState, StateStore};

const SOURCE_MISSING: &str = "source object missing";

/// Per-key async locks.
///
/// Records sharing a content hash resolve to one key; holding its lock from the
/// destination probe through the upload means only the first of them uploads.
#[derive(Default)]
struct KeyLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }
}

/// Where an object ended up.
struct Placed {
    url: String,
    uploaded: bool,
}

/// Shared progress of one run, guarded by a single lock.
struct RunProgress {
    state: MigrationState,
    completed: usize,
    uploads: usize,
    reused: usize,
    planned: usize,
    dry_run_failures: usize,
}

pub struct MigrationEngine {
    repo: AssetRepository,
    destination: Arc<dyn DestinationStore>,
    source: Arc<dyn SourceFetcher>,
    state_store: StateStore,
    settings: MigrationSettings,
    reporter: Arc<dyn Reporter>,
    key_locks: KeyLocks,
}

impl MigrationEngine {
    pub fn new(
        repo: AssetRepository,
        destination: Arc<dyn DestinationStore>,
        source: Arc<dyn SourceFetcher>,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            repo,
            destination,
            source,
            state_store: StateStore::new(settings.state_file.clone()),
            settings,
            reporter: Arc::new(NoOpReporter),
            key_locks: KeyLocks::default(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state_store
    }

    /// Migrate every outstanding record.
    ///
    /// Only failures before the worker pool starts (listing records, reading the
    /// ledger) and the final ledger flush are returned as errors. Per-record
    /// failures end up in the ledger.
    pub async fn run(self: Arc<Self>, dry_run: bool) -> Result<RunSummary, AppError> {
        let records = self
            .repo
            .list_by_provider(&self.settings.source_provider)
            .await?;
        let mut state = match self.state_store.load().await? {
            Some(state) => state,
            None => MigrationState::new(Utc::now()),
        };

        let done = state.processed_ids();
        let outstanding: Vec<AssetRecord> = records
            .into_iter()
            .filter(|r| !done.contains(&r.id))
            .collect();
        let total_outstanding = outstanding.len();

        self.reporter.report(ProgressEvent::RunStarted {
            migration_id: &state.migration_id,
            outstanding: total_outstanding,
            already_processed: done.len(),
            dry_run,
        });

        if outstanding.is_empty() {
            let summary = RunSummary {
                migration_id: state.migration_id.clone(),
                status: RunStatus::Completed,
                dry_run,
                stats: state.stats,
                attempted: 0,
                uploads: 0,
                reused: 0,
                planned: 0,
            };
            self.reporter.report(ProgressEvent::RunFinished { summary: &summary });
            return Ok(summary);
        }

        if !dry_run {
            state.begin_run(total_outstanding);
            self.state_store.save(&state).await?;
        }

        let migration_id = state.migration_id.clone();
        let progress = Arc::new(Mutex::new(RunProgress {
            state,
            completed: 0,
            uploads: 0,
            reused: 0,
            planned: 0,
            dry_run_failures: 0,
        }));

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut handles = Vec::with_capacity(total_outstanding);

        for record in outstanding {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::Internal(format!("Worker pool closed: {}", e)))?;
            let engine = self.clone();
            let progress = progress.clone();
            let migration_id = migration_id.clone();

            let handle = tokio::spawn(async move {
                let (outcome, uploads) = engine.process_record(&record, dry_run, &migration_id).await;
                engine
                    .finish_record(&progress, &record, outcome, uploads, total_outstanding, dry_run)
                    .await;
                drop(permit);
            });
            handles.push(handle);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Migration worker terminated abnormally");
            }
        }

        let mut progress = progress.lock().await;
        let attempted = progress.completed;
        let status = if dry_run {
            RunStatus::from_failed_count(progress.dry_run_failures)
        } else {
            progress.state.finish(Utc::now());
            self.state_store.save(&progress.state).await?;
            progress.state.status
        };

        let summary = RunSummary {
            migration_id,
            status,
            dry_run,
            stats: progress.state.stats,
            attempted,
            uploads: progress.uploads,
            reused: progress.reused,
            planned: progress.planned,
        };
        self.reporter.report(ProgressEvent::RunFinished { summary: &summary });
        Ok(summary)
    }

    async fn finish_record(
        &self,
        progress: &Mutex<RunProgress>,
        record: &AssetRecord,
        outcome: RecordOutcome,
        uploads: usize,
        outstanding: usize,
        dry_run: bool,
    ) {
        let mut progress = progress.lock().await;
        progress.completed += 1;
        progress.uploads += uploads;
        match &outcome {
            RecordOutcome::Success {
                reused_existing: true,
                ..
            } => progress.reused += 1,
            RecordOutcome::DryRun { .. } => progress.planned += 1,
            RecordOutcome::Failed { .. } if dry_run => progress.dry_run_failures += 1,
            _ => {}
        }

        if !dry_run {
            progress.state.record(record, &outcome, Utc::now());
            if let Err(e) = self.state_store.save(&progress.state).await {
                tracing::error!(
                    record_id = record.id,
                    path = %self.state_store.path().display(),
                    error = %e,
                    "Failed to flush migration state"
                );
            }
        }

        self.reporter.report(ProgressEvent::RecordFinished {
            id: record.id,
            name: &record.name,
            outcome: &outcome,
            completed: progress.completed,
            outstanding,
        });
    }

    /// Determine one record's outcome and how many objects it uploaded.
    async fn process_record(
        &self,
        record: &AssetRecord,
        dry_run: bool,
        migration_id: &str,
    ) -> (RecordOutcome, usize) {
        let failed = |error: String| (RecordOutcome::Failed { error }, 0);

        let source_url =
            match resolve_source_url(&record.url, self.settings.source_base_url.as_deref()) {
                Ok(url) => url,
                Err(e) => return failed(e.to_string()),
            };

        let declared_size = match self.source.probe(&source_url).await {
            Ok(SourceProbe::Missing { status }) => {
                tracing::debug!(record_id = record.id, status, url = %source_url, "Source object missing");
                return (
                    RecordOutcome::Skipped {
                        reason: SOURCE_MISSING.to_string(),
                    },
                    0,
                );
            }
            Ok(SourceProbe::Available { content_length }) => content_length,
            Err(e) => return failed(e.to_string()),
        };

        if let Some(size) = declared_size {
            if size > self.settings.max_asset_bytes {
                let err = StorageError::PayloadTooLarge {
                    size,
                    limit: self.settings.max_asset_bytes,
                };
                return failed(err.to_string());
            }
        }

        if record.hash.trim().is_empty() {
            return failed("record has no content hash".to_string());
        }
        let key = asset_key(&record.hash, &record.ext);

        if dry_run {
            return match self.plan(&key).await {
                Ok((planned_url, exists_at_destination)) => (
                    RecordOutcome::DryRun {
                        planned_url,
                        key,
                        exists_at_destination,
                    },
                    0,
                ),
                Err(e) => failed(e.to_string()),
            };
        }

        let mut tx = match self.repo.database().begin().await {
            Ok(tx) => tx,
            Err(e) => return failed(e.to_string()),
        };

        match self
            .migrate_in_transaction(&mut tx, record, &source_url, &key, declared_size, migration_id)
            .await
        {
            Ok((placed, variant_uploads)) => match tx.commit().await {
                Ok(()) => {
                    let uploads = variant_uploads + usize::from(placed.uploaded);
                    (
                        RecordOutcome::Success {
                            new_url: placed.url,
                            key,
                            reused_existing: !placed.uploaded,
                        },
                        uploads,
                    )
                }
                Err(e) => failed(e.to_string()),
            },
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(
                        record_id = record.id,
                        error = %rollback_err,
                        "Failed to roll back record transaction"
                    );
                }
                failed(e.to_string())
            }
        }
    }

    /// Dry-run view of a key: the tagged placeholder url and whether it already exists.
    async fn plan(&self, key: &str) -> Result<(String, bool), AppError> {
        let exists = self.destination.exists(key).await?;
        let url = self.destination.public_url_for(key)?;
        Ok((format!("{}{}", DRY_RUN_URL_PREFIX, url), exists))
    }

    async fn migrate_in_transaction(
        &self,
        tx: &mut DbTransaction,
        record: &AssetRecord,
        source_url: &str,
        key: &str,
        declared_size: Option<u64>,
        migration_id: &str,
    ) -> Result<(Placed, usize), AppError> {
        let placed = self
            .place_object(record.id, source_url, key, record.content_type(), declared_size)
            .await?;

        let (formats, variant_uploads) = self.migrate_variants(record).await?;

        let rewrite = AssetRewrite {
            url: placed.url.clone(),
            provider: self.settings.destination_provider.clone(),
            provider_metadata: json!({
                "bucket": self.destination.bucket(),
                "key": key,
                "migrated_from": self.settings.source_provider,
                "migrated_at": Utc::now().to_rfc3339(),
                "migration_id": migration_id,
            }),
            formats,
        };
        self.repo.rewrite_to_destination(tx, record.id, &rewrite).await?;

        Ok((placed, variant_uploads))
    }

    /// Make sure `key` holds the object behind `source_url` and return its public url.
    ///
    /// An existing object is reused unless the source declared a different size.
    async fn place_object(
        &self,
        record_id: i64,
        source_url: &str,
        key: &str,
        content_type: &str,
        declared_size: Option<u64>,
    ) -> Result<Placed, AppError> {
        let lock = self.key_locks.lock_for(key);
        let _guard = lock.lock().await;

        if let Some(existing) = self.destination.object_size(key).await? {
            match declared_size {
                Some(size) if size != existing => {
                    tracing::warn!(
                        record_id,
                        key = %key,
                        source_size = size,
                        destination_size = existing,
                        "Destination object size differs from source, uploading again"
                    );
                }
                _ => {
                    tracing::debug!(record_id, key = %key, "Reusing existing destination object");
                    return Ok(Placed {
                        url: self.destination.public_url_for(key)?,
                        uploaded: false,
                    });
                }
            }
        }

        let data = self.download(record_id, source_url).await?;
        let url = self.destination.upload(data, key, content_type).await?;
        Ok(Placed {
            url,
            uploaded: true,
        })
    }

    /// Fetch with linear backoff: the wait before attempt `n + 1` is `n * base`.
    async fn download(&self, record_id: i64, url: &str) -> Result<Bytes, StorageError> {
        let attempts = self.settings.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.source.fetch(url, self.settings.max_asset_bytes).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        record_id,
                        url = %url,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Download attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_base_delay * attempt).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(StorageError::DownloadFailed(format!(
            "download exhausted after {} attempts: {}",
            attempts, last_error
        )))
    }

    /// Transfer the renditions listed in `formats`.
    ///
    /// Returns the rewritten blob (`None` when nothing changed) and the number of
    /// uploads. A rendition whose source is gone, or that has no content hash to key
    /// it by, keeps its url.
    async fn migrate_variants(
        &self,
        record: &AssetRecord,
    ) -> Result<(Option<JsonValue>, usize), AppError> {
        let variants = record.format_variants();
        let Some(mut formats) = record.formats.clone().filter(|_| !variants.is_empty()) else {
            return Ok((None, 0));
        };

        let mut changed = false;
        let mut uploads = 0;
        for variant in &variants {
            let Some(placed) = self.migrate_variant(record, variant).await? else {
                continue;
            };
            uploads += usize::from(placed.uploaded);
            if let Some(entry) = formats.get_mut(&variant.name) {
                entry["url"] = JsonValue::String(placed.url);
                changed = true;
            }
        }

        Ok((changed.then_some(formats), uploads))
    }

    async fn migrate_variant(
        &self,
        record: &AssetRecord,
        variant: &FormatVariant,
    ) -> Result<Option<Placed>, AppError> {
        if variant.hash.trim().is_empty() {
            let message = format!(
                "Record {}: format '{}' has no content hash, keeping {}",
                record.id, variant.name, variant.url
            );
            self.reporter.report(ProgressEvent::Warning { message: &message });
            return Ok(None);
        }

        let key = asset_key(&variant.hash, &variant.ext);
        if variant.url == self.destination.public_url_for(&key)? {
            return Ok(None);
        }

        let source_url =
            resolve_source_url(&variant.url, self.settings.source_base_url.as_deref())?;
        let declared_size = match self.source.probe(&source_url).await? {
            SourceProbe::Missing { .. } => {
                let message = format!(
                    "Record {}: source of format '{}' is missing, keeping {}",
                    record.id, variant.name, variant.url
                );
                self.reporter.report(ProgressEvent::Warning { message: &message });
                return Ok(None);
            }
            SourceProbe::Available { content_length } => content_length,
        };

        let placed = self
            .place_object(record.id, &source_url, &key, variant.content_type(), declared_size)
            .await?;
        Ok(Some(placed))
    }
}
