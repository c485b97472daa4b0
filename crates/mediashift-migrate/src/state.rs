//! Migration ledger
//!
//! One [`MigrationState`] document accumulates the outcome of every record across
//! runs. [`StateStore`] persists it by writing a sibling temp file and renaming it
//! over the ledger, so a crash mid-flush never leaves a truncated document.

use chrono::{DateTime, Utc};
use mediashift_core::{AppError, AssetId, AssetRecord, RecordOutcome, RunStats, RunStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEntry {
    pub id: AssetId,
    pub name: String,
    pub old_url: String,
    pub new_url: String,
    pub key: String,
    pub reused_existing: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub id: AssetId,
    pub name: String,
    pub url: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub id: AssetId,
    pub name: String,
    pub url: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Durable progress of one migration across all of its runs.
///
/// An id lives in at most one of `processed`, `failed` and `skipped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationState {
    pub migration_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub stats: RunStats,
    #[serde(default)]
    pub processed: Vec<ProcessedEntry>,
    #[serde(default)]
    pub failed: Vec<FailedEntry>,
    #[serde(default)]
    pub skipped: Vec<SkippedEntry>,
}

impl MigrationState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            migration_id: format!("migration_{}", now.timestamp_millis()),
            start_time: now,
            end_time: None,
            status: RunStatus::InProgress,
            stats: RunStats::default(),
            processed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Ids that were migrated successfully. Failed and skipped ids are retried.
    pub fn processed_ids(&self) -> HashSet<AssetId> {
        self.processed.iter().map(|e| e.id).collect()
    }

    /// Mark a run as started with `outstanding` records left to attempt.
    pub fn begin_run(&mut self, outstanding: usize) {
        self.status = RunStatus::InProgress;
        self.end_time = None;
        self.stats.total = self.processed.len() + outstanding;
    }

    /// Record the outcome of one attempt, replacing any earlier entry for the id.
    pub fn record(&mut self, record: &AssetRecord, outcome: &RecordOutcome, at: DateTime<Utc>) {
        let id = record.id;
        match outcome {
            RecordOutcome::Success {
                new_url,
                key,
                reused_existing,
            } => {
                self.forget(id);
                self.processed.push(ProcessedEntry {
                    id,
                    name: record.name.clone(),
                    old_url: record.url.clone(),
                    new_url: new_url.clone(),
                    key: key.clone(),
                    reused_existing: *reused_existing,
                    timestamp: at,
                });
            }
            RecordOutcome::Failed { error } => {
                self.forget(id);
                self.failed.push(FailedEntry {
                    id,
                    name: record.name.clone(),
                    url: record.url.clone(),
                    error: error.clone(),
                    timestamp: at,
                });
            }
            RecordOutcome::Skipped { reason } => {
                self.forget(id);
                self.skipped.push(SkippedEntry {
                    id,
                    name: record.name.clone(),
                    url: record.url.clone(),
                    reason: reason.clone(),
                    timestamp: at,
                });
            }
            RecordOutcome::DryRun { .. } => return,
        }
        self.refresh_stats();
    }

    /// Close the run. The status only distinguishes clean from partial completion.
    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.refresh_stats();
        self.status = RunStatus::from_failed_count(self.failed.len());
        self.end_time = Some(at);
    }

    fn forget(&mut self, id: AssetId) {
        self.processed.retain(|e| e.id != id);
        self.failed.retain(|e| e.id != id);
        self.skipped.retain(|e| e.id != id);
    }

    fn refresh_stats(&mut self) {
        self.stats.success = self.processed.len();
        self.stats.failed = self.failed.len();
        self.stats.skipped = self.skipped.len();
        self.stats.processed = self.stats.success + self.stats.failed + self.stats.skipped;
        self.stats.total = self.stats.total.max(self.stats.processed);
    }
}

/// File-backed ledger.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "migration-state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Read the ledger; `None` when no run has happened yet.
    pub async fn load(&self) -> Result<Option<MigrationState>, AppError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state = serde_json::from_slice(&raw).map_err(|e| {
            AppError::Serialization(format!(
                "Ledger {} is not valid: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(state))
    }

    /// Replace the ledger atomically.
    pub async fn save(&self, state: &MigrationState) -> Result<(), AppError> {
        let json = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp).await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &json).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}
