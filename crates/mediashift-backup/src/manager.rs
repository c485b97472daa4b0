//! Backup and restore of the content database
//!
//! The embedded engine is snapshotted with a file copy, the networked engine with
//! `pg_dump` in custom format. Any artifact that cannot be written or verified
//! aborts the whole invocation.

use chrono::Utc;
use mediashift_core::constants::BACKUP_TIMESTAMP_FORMAT;
use mediashift_core::{
    AppError, AssetRecord, DatabaseClient, DatabaseConfig, NoOpReporter, ProgressEvent,
    ProviderCount, Reporter,
};
use mediashift_db::{AssetRepository, Database};
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use crate::confirm::Confirm;

const ARTIFACT_PATTERN: &str =
    r"^(database|files|mapping|report)-(\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2})\.(db|dump|json|csv|txt)$";

const CSV_HEADER: [&str; 8] = [
    "id",
    "name",
    "hash",
    "original_url",
    "new_url",
    "status",
    "migrated_at",
    "error",
];

/// Artifacts of one backup invocation.
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub timestamp: String,
    pub client: DatabaseClient,
    pub source_provider: String,
    pub source_records: usize,
    pub provider_counts: Vec<ProviderCount>,
    pub database: PathBuf,
    pub json_export: PathBuf,
    pub csv_mapping: PathBuf,
    pub report: Option<PathBuf>,
}

/// Backup artifacts found on disk for one timestamp token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupSet {
    pub timestamp: String,
    pub database: Option<PathBuf>,
    pub json_export: Option<PathBuf>,
    pub csv_mapping: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

impl BackupSet {
    pub fn is_complete(&self) -> bool {
        self.database.is_some()
            && self.json_export.is_some()
            && self.csv_mapping.is_some()
            && self.report.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub artifact: PathBuf,
    pub safety_copy: Option<PathBuf>,
    pub counts_before: Vec<ProviderCount>,
    pub counts_after: Vec<ProviderCount>,
    /// Where the migration ledger was moved, if one existed.
    pub ledger_moved_to: Option<PathBuf>,
}

pub struct BackupManager {
    repo: AssetRepository,
    db_config: DatabaseConfig,
    backup_dir: PathBuf,
    source_provider: String,
    reporter: Arc<dyn Reporter>,
}

pub fn new_timestamp() -> String {
    Utc::now().format(BACKUP_TIMESTAMP_FORMAT).to_string()
}

impl BackupManager {
    pub fn new(
        repo: AssetRepository,
        db_config: DatabaseConfig,
        backup_dir: impl Into<PathBuf>,
        source_provider: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            db_config,
            backup_dir: backup_dir.into(),
            source_provider: source_provider.into(),
            reporter: Arc::new(NoOpReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    fn artifact_path(&self, kind: &str, timestamp: &str, ext: &str) -> PathBuf {
        self.backup_dir.join(format!("{}-{}.{}", kind, timestamp, ext))
    }

    fn database_ext(&self) -> &'static str {
        match self.db_config.client {
            DatabaseClient::Sqlite => "db",
            DatabaseClient::Postgres => "dump",
        }
    }

    /// Full backup: database snapshot, JSON export, CSV mapping and report.
    ///
    /// On failure every artifact already written for this invocation is removed, so
    /// an aborted backup never shows up as a restorable set.
    pub async fn run_backup(&self) -> Result<BackupInfo, AppError> {
        self.run_backup_at(&new_timestamp()).await
    }

    pub(crate) async fn run_backup_at(&self, timestamp: &str) -> Result<BackupInfo, AppError> {
        tokio::fs::create_dir_all(&self.backup_dir).await?;

        let info = match self.write_artifacts(timestamp).await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(timestamp = %timestamp, error = %e, "Backup failed");
                self.discard_artifacts(timestamp).await;
                return Err(e);
            }
        };

        tracing::info!(
            timestamp = %info.timestamp,
            source_records = info.source_records,
            backup_dir = %self.backup_dir.display(),
            "Backup completed"
        );
        Ok(info)
    }

    async fn write_artifacts(&self, timestamp: &str) -> Result<BackupInfo, AppError> {
        let provider_counts = self.repo.provider_counts().await?;
        self.reporter.report(ProgressEvent::ProviderCounts {
            stage: "backup",
            counts: &provider_counts,
        });
        let records = self.repo.list_by_provider(&self.source_provider).await?;

        let database = self.backup_database(timestamp).await?;
        let json_export = self.export_to_json(&records, timestamp).await?;
        let csv_mapping = self.export_to_csv(&records, timestamp).await?;

        let mut info = BackupInfo {
            timestamp: timestamp.to_string(),
            client: self.db_config.client,
            source_provider: self.source_provider.clone(),
            source_records: records.len(),
            provider_counts,
            database,
            json_export,
            csv_mapping,
            report: None,
        };
        info.report = Some(self.generate_report(&info).await?);
        Ok(info)
    }

    async fn discard_artifacts(&self, timestamp: &str) {
        let candidates = [
            self.artifact_path("database", timestamp, self.database_ext()),
            self.artifact_path("files", timestamp, "json"),
            self.artifact_path("mapping", timestamp, "csv"),
            self.artifact_path("report", timestamp, "txt"),
        ];
        for path in candidates {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::info!(path = %path.display(), "Removed partial backup artifact"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not remove partial backup artifact"
                ),
            }
        }
    }

    /// Snapshot the live database.
    pub async fn backup_database(&self, timestamp: &str) -> Result<PathBuf, AppError> {
        tokio::fs::create_dir_all(&self.backup_dir).await?;
        let target = self.artifact_path("database", timestamp, self.database_ext());

        match self.db_config.client {
            DatabaseClient::Sqlite => {
                let bytes = tokio::fs::copy(&self.db_config.filename, &target)
                    .await
                    .map_err(|e| {
                        AppError::BackupArtifactMissing(format!(
                            "copy of {} failed: {}",
                            self.db_config.filename.display(),
                            e
                        ))
                    })?;
                tracing::debug!(path = %target.display(), size_bytes = bytes, "Database file copied");
            }
            DatabaseClient::Postgres => {
                let url = self.postgres_url()?;
                run_tool(
                    "pg_dump",
                    &[
                        "--format=custom",
                        "--no-owner",
                        "--file",
                        &target.to_string_lossy(),
                        "--dbname",
                        url,
                    ],
                )
                .await?;
            }
        }

        ensure_artifact(&target).await?;
        self.reporter.report(ProgressEvent::ArtifactWritten {
            kind: "database",
            path: &target,
        });
        Ok(target)
    }

    /// Self-describing JSON snapshot of `records`.
    pub async fn export_to_json(
        &self,
        records: &[AssetRecord],
        timestamp: &str,
    ) -> Result<PathBuf, AppError> {
        let target = self.artifact_path("files", timestamp, "json");
        let document = json!({
            "exported_at": Utc::now().to_rfc3339(),
            "database_client": self.db_config.client,
            "source_provider": self.source_provider,
            "record_count": records.len(),
            "records": records,
        });
        tokio::fs::write(&target, serde_json::to_vec_pretty(&document)?).await?;

        self.reporter.report(ProgressEvent::ArtifactWritten {
            kind: "json export",
            path: &target,
        });
        Ok(target)
    }

    /// Tracking sheet: one row per record with empty columns to fill in by hand.
    pub async fn export_to_csv(
        &self,
        records: &[AssetRecord],
        timestamp: &str,
    ) -> Result<PathBuf, AppError> {
        let target = self.artifact_path("mapping", timestamp, "csv");

        let mut wtr = csv::Writer::from_writer(Vec::new());
        let csv_err = |e: csv::Error| AppError::Serialization(format!("CSV error: {}", e));
        wtr.write_record(CSV_HEADER).map_err(csv_err)?;
        for r in records {
            let id = r.id.to_string();
            wtr.write_record([
                id.as_str(),
                r.name.as_str(),
                r.hash.as_str(),
                r.url.as_str(),
                "",
                "",
                "",
                "",
            ])
            .map_err(csv_err)?;
        }
        let data = wtr
            .into_inner()
            .map_err(|e| AppError::Serialization(format!("CSV error: {}", e)))?;
        tokio::fs::write(&target, data).await?;

        self.reporter.report(ProgressEvent::ArtifactWritten {
            kind: "csv mapping",
            path: &target,
        });
        Ok(target)
    }

    /// Human-readable summary. Fails if any artifact it lists is missing.
    pub async fn generate_report(&self, info: &BackupInfo) -> Result<PathBuf, AppError> {
        let target = self.artifact_path("report", &info.timestamp, "txt");

        let mut lines = vec![
            "MEDIA MIGRATION BACKUP REPORT".to_string(),
            "=============================".to_string(),
            format!("Timestamp:        {}", info.timestamp),
            format!("Database client:  {}", info.client),
            format!("Source provider:  {}", info.source_provider),
            format!("Source records:   {}", info.source_records),
            String::new(),
            "Records by provider:".to_string(),
        ];
        for c in &info.provider_counts {
            lines.push(format!(
                "  {:<20} {}",
                c.provider.as_deref().unwrap_or("<none>"),
                c.count
            ));
        }
        lines.push(String::new());
        lines.push("Artifacts:".to_string());
        for (label, path) in [
            ("database", &info.database),
            ("json export", &info.json_export),
            ("csv mapping", &info.csv_mapping),
        ] {
            let size = ensure_artifact(path).await?;
            lines.push(format!("  [ok] {:<12} {} ({} bytes)", label, path.display(), size));
        }
        lines.push(String::new());
        lines.push(format!(
            "Restore with: restore_assets --timestamp {}",
            info.timestamp
        ));
        lines.push(String::new());

        tokio::fs::write(&target, lines.join("\n")).await?;
        ensure_artifact(&target).await?;

        self.reporter.report(ProgressEvent::ArtifactWritten {
            kind: "report",
            path: &target,
        });
        Ok(target)
    }

    /// Backup sets in `dir`, newest first. A missing directory has none.
    pub async fn list_backups(dir: &Path) -> Result<Vec<BackupSet>, AppError> {
        let pattern =
            Regex::new(ARTIFACT_PATTERN).map_err(|e| AppError::Internal(e.to_string()))?;

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sets: BTreeMap<String, BackupSet> = BTreeMap::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(caps) = name.to_str().and_then(|n| pattern.captures(n)) else {
                continue;
            };
            let timestamp = caps[2].to_string();
            let set = sets.entry(timestamp.clone()).or_insert_with(|| BackupSet {
                timestamp,
                ..BackupSet::default()
            });
            let path = entry.path();
            match (&caps[1], &caps[3]) {
                ("database", "db" | "dump") => set.database = Some(path),
                ("files", "json") => set.json_export = Some(path),
                ("mapping", "csv") => set.csv_mapping = Some(path),
                ("report", "txt") => set.report = Some(path),
                _ => {}
            }
        }

        // Timestamp tokens sort chronologically.
        Ok(sets.into_values().rev().collect())
    }

    /// The set to restore.
    ///
    /// An explicit `timestamp` only needs a database snapshot. Without one, the newest
    /// complete set wins; sets missing any artifact are left over from aborted runs.
    pub async fn select_backup(
        dir: &Path,
        timestamp: Option<&str>,
    ) -> Result<BackupSet, AppError> {
        let sets = Self::list_backups(dir).await?;
        let found = match timestamp {
            Some(ts) => sets.into_iter().find(|s| s.timestamp == ts),
            None => sets.into_iter().find(BackupSet::is_complete),
        };
        match found {
            Some(set) if set.database.is_some() => Ok(set),
            _ => Err(AppError::BackupArtifactMissing(format!(
                "no {}backup{} in {}",
                if timestamp.is_some() { "database " } else { "complete " },
                timestamp.map(|t| format!(" for {}", t)).unwrap_or_default(),
                dir.display()
            ))),
        }
    }

    /// Replace the live database with `artifact`.
    ///
    /// Asks `confirm` first, keeps a pre-restore copy of the live database, and
    /// re-counts records per provider afterwards. An existing migration ledger is
    /// moved aside because it describes the database being replaced. Consumes the
    /// manager: its connection pool is closed before the database is replaced.
    pub async fn restore_database(
        self,
        artifact: &Path,
        confirm: &dyn Confirm,
        ledger: Option<&Path>,
    ) -> Result<RestoreReport, AppError> {
        ensure_artifact(artifact).await?;

        let counts_before = match self.repo.provider_counts().await {
            Ok(counts) => counts,
            Err(e) => {
                tracing::warn!(error = %e, "Could not count records before restore");
                Vec::new()
            }
        };
        self.reporter.report(ProgressEvent::ProviderCounts {
            stage: "before restore",
            counts: &counts_before,
        });

        let prompt = format!(
            "This will overwrite the {} database with {}. Continue?",
            self.db_config.client,
            artifact.display()
        );
        if !confirm.confirm(&prompt) {
            tracing::info!("Restore cancelled");
            return Err(AppError::RestoreAborted);
        }

        let timestamp = new_timestamp();
        tokio::fs::create_dir_all(&self.backup_dir).await?;
        self.repo.database().close().await;

        let safety_copy = match self.db_config.client {
            DatabaseClient::Sqlite => self.restore_sqlite(artifact, &timestamp).await?,
            DatabaseClient::Postgres => Some(self.restore_postgres(artifact, &timestamp).await?),
        };

        let ledger_moved_to = match ledger {
            Some(path) => move_ledger_aside(path, &timestamp).await?,
            None => None,
        };

        let db = Database::connect(&self.db_config).await?;
        let repo = AssetRepository::new(db.clone(), &self.db_config.table)?;
        let counts_after = repo.provider_counts().await?;
        db.close().await;
        self.reporter.report(ProgressEvent::ProviderCounts {
            stage: "after restore",
            counts: &counts_after,
        });

        tracing::info!(artifact = %artifact.display(), "Restore completed");
        Ok(RestoreReport {
            artifact: artifact.to_path_buf(),
            safety_copy,
            counts_before,
            counts_after,
            ledger_moved_to,
        })
    }

    async fn restore_sqlite(
        &self,
        artifact: &Path,
        timestamp: &str,
    ) -> Result<Option<PathBuf>, AppError> {
        let live = &self.db_config.filename;

        let safety_copy = if tokio::fs::try_exists(live).await? {
            let copy = self.artifact_path("pre-restore", timestamp, "db");
            tokio::fs::copy(live, &copy).await?;
            self.reporter.report(ProgressEvent::ArtifactWritten {
                kind: "pre-restore copy",
                path: &copy,
            });
            Some(copy)
        } else {
            None
        };

        // Stale journal files would be replayed onto the restored database.
        for suffix in ["-wal", "-shm", "-journal"] {
            let mut sidecar = live.as_os_str().to_os_string();
            sidecar.push(suffix);
            match tokio::fs::remove_file(PathBuf::from(sidecar)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(parent) = live.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(artifact, live).await?;
        Ok(safety_copy)
    }

    async fn restore_postgres(&self, artifact: &Path, timestamp: &str) -> Result<PathBuf, AppError> {
        let url = self.postgres_url()?;

        let copy = self.artifact_path("pre-restore", timestamp, "dump");
        run_tool(
            "pg_dump",
            &[
                "--format=custom",
                "--no-owner",
                "--file",
                &copy.to_string_lossy(),
                "--dbname",
                url,
            ],
        )
        .await?;
        ensure_artifact(&copy).await?;
        self.reporter.report(ProgressEvent::ArtifactWritten {
            kind: "pre-restore copy",
            path: &copy,
        });

        run_tool(
            "pg_restore",
            &[
                "--clean",
                "--if-exists",
                "--no-owner",
                "--dbname",
                url,
                &artifact.to_string_lossy(),
            ],
        )
        .await?;
        Ok(copy)
    }

    fn postgres_url(&self) -> Result<&str, AppError> {
        self.db_config
            .url
            .as_deref()
            .ok_or_else(|| AppError::Config("DATABASE_URL must be set for postgres".to_string()))
    }
}

/// Size of `path`, or [`AppError::BackupArtifactMissing`] when it is absent or empty.
async fn ensure_artifact(path: &Path) -> Result<u64, AppError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(AppError::BackupArtifactMissing(format!(
            "{} is empty",
            path.display()
        ))),
        Err(_) => Err(AppError::BackupArtifactMissing(path.display().to_string())),
    }
}

async fn move_ledger_aside(path: &Path, timestamp: &str) -> Result<Option<PathBuf>, AppError> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(None);
    }
    let mut target = path.as_os_str().to_os_string();
    target.push(format!(".restored-{}", timestamp));
    let target = PathBuf::from(target);
    tokio::fs::rename(path, &target).await?;
    tracing::info!(
        from = %path.display(),
        to = %target.display(),
        "Migration ledger moved aside"
    );
    Ok(Some(target))
}

async fn run_tool(program: &str, args: &[&str]) -> Result<(), AppError> {
    tracing::debug!(program, "Running external tool");
    let output = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to execute {}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::Internal(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}
