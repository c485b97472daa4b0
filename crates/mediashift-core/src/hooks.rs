//! Progress reporting hooks
//!
//! Components never log progress through a global. They receive a [`Reporter`]
//! and emit [`ProgressEvent`]s; the binaries pass a [`TracingReporter`], tests pass
//! a [`NoOpReporter`] or their own recorder.

use std::path::Path;

use crate::models::{AssetId, ProviderCount, RecordOutcome, RunSummary};

/// Events emitted by the engine and the backup manager.
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    RunStarted {
        migration_id: &'a str,
        outstanding: usize,
        already_processed: usize,
        dry_run: bool,
    },
    RecordFinished {
        id: AssetId,
        name: &'a str,
        outcome: &'a RecordOutcome,
        completed: usize,
        outstanding: usize,
    },
    RunFinished {
        summary: &'a RunSummary,
    },
    ArtifactWritten {
        kind: &'a str,
        path: &'a Path,
    },
    ProviderCounts {
        stage: &'a str,
        counts: &'a [ProviderCount],
    },
    Warning {
        message: &'a str,
    },
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: ProgressEvent<'_>);
}

/// Reporter that discards every event.
pub struct NoOpReporter;

impl Reporter for NoOpReporter {
    fn report(&self, _event: ProgressEvent<'_>) {}
}

/// Reporter that turns events into structured `tracing` records.
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: ProgressEvent<'_>) {
        match event {
            ProgressEvent::RunStarted {
                migration_id,
                outstanding,
                already_processed,
                dry_run,
            } => {
                tracing::info!(
                    migration_id = %migration_id,
                    outstanding,
                    already_processed,
                    dry_run,
                    "Migration run started"
                );
            }
            ProgressEvent::RecordFinished {
                id,
                name,
                outcome,
                completed,
                outstanding,
            } => match outcome {
                RecordOutcome::Success {
                    new_url,
                    reused_existing,
                    ..
                } => tracing::info!(
                    record_id = id,
                    name = %name,
                    new_url = %new_url,
                    reused_existing,
                    progress = format!("{}/{}", completed, outstanding),
                    "Record migrated"
                ),
                RecordOutcome::Skipped { reason } => tracing::warn!(
                    record_id = id,
                    name = %name,
                    reason = %reason,
                    progress = format!("{}/{}", completed, outstanding),
                    "Record skipped"
                ),
                RecordOutcome::Failed { error } => tracing::error!(
                    record_id = id,
                    name = %name,
                    error = %error,
                    progress = format!("{}/{}", completed, outstanding),
                    "Record failed"
                ),
                RecordOutcome::DryRun {
                    planned_url,
                    exists_at_destination,
                    ..
                } => tracing::info!(
                    record_id = id,
                    name = %name,
                    planned_url = %planned_url,
                    exists_at_destination,
                    progress = format!("{}/{}", completed, outstanding),
                    "Dry run: record would be migrated"
                ),
            },
            ProgressEvent::RunFinished { summary } => {
                tracing::info!(
                    migration_id = %summary.migration_id,
                    status = ?summary.status,
                    dry_run = summary.dry_run,
                    total = summary.stats.total,
                    success = summary.stats.success,
                    failed = summary.stats.failed,
                    skipped = summary.stats.skipped,
                    uploads = summary.uploads,
                    reused = summary.reused,
                    "Migration run finished"
                );
            }
            ProgressEvent::ArtifactWritten { kind, path } => {
                tracing::info!(kind = %kind, path = %path.display(), "Artifact written");
            }
            ProgressEvent::ProviderCounts { stage, counts } => {
                for c in counts {
                    tracing::info!(
                        stage = %stage,
                        provider = c.provider.as_deref().unwrap_or("<none>"),
                        count = c.count,
                        "Records by provider"
                    );
                }
            }
            ProgressEvent::Warning { message } => {
                tracing::warn!("{}", message);
            }
        }
    }
}
