//! Command implementations shared by the standalone binaries and `mediashift`.

use anyhow::{Context, Result};
use clap::Args;
use mediashift_backup::{AssumeYes, BackupManager, Confirm, StdinConfirm};
use mediashift_core::{Config, ProviderCount, RunStatus, RunSummary, TracingReporter};
use mediashift_db::{AssetRepository, Database};
use mediashift_migrate::{MigrationEngine, StateStore};
use mediashift_storage::{HttpSource, R2Storage};
use std::sync::Arc;

#[derive(Args, Debug, Clone)]
pub struct EnvArgs {
    /// Environment name; `.env.<name>` is loaded before `.env`
    #[arg(long, default_value = "development")]
    pub env: String,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    #[command(flatten)]
    pub common: EnvArgs,
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub common: EnvArgs,

    /// Report what would be migrated without moving bytes or writing rows
    #[arg(long)]
    pub dry_run: bool,

    /// Override MIGRATION_CONCURRENCY
    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    #[command(flatten)]
    pub common: EnvArgs,

    /// Backup timestamp to restore (default: most recent complete backup)
    #[arg(long, value_name = "TIMESTAMP")]
    pub timestamp: Option<String>,

    /// Skip the interactive confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub common: EnvArgs,

    /// Output format: json or table (default: table)
    #[arg(long, default_value = "table")]
    pub format: String,
}

fn load_config(env: &str) -> Result<Config> {
    let config = Config::from_env(env)
        .with_context(|| format!("Failed to load configuration for '{}'", env))?;
    config.validate().context("Invalid configuration")?;
    tracing::info!(
        environment = %config.environment,
        client = %config.database.client,
        "Configuration loaded"
    );
    Ok(config)
}

/// Connect with a pool of at least `min_connections`.
async fn open_repository(config: &Config, min_connections: u32) -> Result<AssetRepository> {
    let mut db_config = config.database.clone();
    db_config.max_connections = db_config.max_connections.max(min_connections);
    let db = Database::connect(&db_config)
        .await
        .context("Failed to connect to database")?;
    Ok(AssetRepository::new(db, &db_config.table)?)
}

pub async fn backup(args: BackupArgs) -> Result<()> {
    let config = load_config(&args.common.env)?;
    let repo = open_repository(&config, 1).await?;

    let manager = BackupManager::new(
        repo.clone(),
        config.database.clone(),
        &config.backup_dir,
        &config.migration.source_provider,
    )
    .with_reporter(Arc::new(TracingReporter));
    let info = manager.run_backup().await.context("Backup failed")?;
    repo.database().close().await;

    println!("Backup {} complete", info.timestamp);
    println!("  Source records: {}", info.source_records);
    println!("  Database:       {}", info.database.display());
    println!("  JSON export:    {}", info.json_export.display());
    println!("  CSV mapping:    {}", info.csv_mapping.display());
    if let Some(report) = &info.report {
        println!("  Report:         {}", report.display());
    }
    print_counts("Records by provider", &info.provider_counts);
    Ok(())
}

pub async fn migrate(args: MigrateArgs) -> Result<()> {
    let mut config = load_config(&args.common.env)?;
    if let Some(concurrency) = args.concurrency {
        config.migration.concurrency = concurrency;
        config.migration.validate()?;
    }

    let destination = R2Storage::new(config.require_destination()?)
        .context("Invalid destination configuration")?;
    let source = HttpSource::new(
        config.migration.probe_timeout,
        config.migration.download_timeout,
    )?;
    let workers = u32::try_from(config.migration.concurrency).unwrap_or(u32::MAX);
    let repo = open_repository(&config, workers.saturating_add(1)).await?;

    if config.is_production() && !args.dry_run {
        tracing::warn!("Migrating production data; make sure a backup was taken first");
    }

    let engine = Arc::new(
        MigrationEngine::new(
            repo.clone(),
            Arc::new(destination),
            Arc::new(source),
            config.migration.clone(),
        )
        .with_reporter(Arc::new(TracingReporter)),
    );
    let summary = engine.run(args.dry_run).await.context("Migration failed")?;
    repo.database().close().await;

    print_summary(&summary);
    if !summary.dry_run {
        println!("Ledger: {}", config.migration.state_file.display());
    }
    Ok(())
}

pub async fn restore(args: RestoreArgs) -> Result<()> {
    let config = load_config(&args.common.env)?;
    let set = BackupManager::select_backup(&config.backup_dir, args.timestamp.as_deref()).await?;
    let Some(artifact) = set.database.clone() else {
        anyhow::bail!("Backup {} has no database snapshot", set.timestamp);
    };
    println!("Restoring backup {} from {}", set.timestamp, artifact.display());

    let repo = open_repository(&config, 1).await?;
    let manager = BackupManager::new(
        repo,
        config.database.clone(),
        &config.backup_dir,
        &config.migration.source_provider,
    )
    .with_reporter(Arc::new(TracingReporter));

    let confirm: Box<dyn Confirm> = if args.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinConfirm)
    };
    let report = manager
        .restore_database(&artifact, &*confirm, Some(config.migration.state_file.as_path()))
        .await?;

    println!("Restore complete");
    if let Some(copy) = &report.safety_copy {
        println!("  Pre-restore copy: {}", copy.display());
    }
    if let Some(ledger) = &report.ledger_moved_to {
        println!("  Previous ledger:  {}", ledger.display());
    }
    print_counts("Before restore", &report.counts_before);
    print_counts("After restore", &report.counts_after);
    Ok(())
}

pub async fn status(args: StatusArgs) -> Result<()> {
    let config = load_config(&args.common.env)?;
    let state = StateStore::new(&config.migration.state_file)
        .load()
        .await
        .context("Failed to read migration ledger")?;
    let repo = open_repository(&config, 1).await?;
    let counts = repo.provider_counts().await?;
    repo.database().close().await;

    if args.format == "json" {
        let out = serde_json::json!({ "ledger": state, "provider_counts": counts });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match &state {
        Some(state) => {
            println!("Migration {}", state.migration_id);
            println!("  Status:    {}", status_label(state.status));
            println!("  Started:   {}", state.start_time.to_rfc3339());
            if let Some(end) = state.end_time {
                println!("  Finished:  {}", end.to_rfc3339());
            }
            println!(
                "  Processed: {}/{} (success {}, failed {}, skipped {})",
                state.stats.processed,
                state.stats.total,
                state.stats.success,
                state.stats.failed,
                state.stats.skipped
            );
            for entry in &state.failed {
                println!("  failed  #{} {}: {}", entry.id, entry.name, entry.error);
            }
        }
        None => println!("No migration ledger at {}", config.migration.state_file.display()),
    }
    print_counts("Records by provider", &counts);
    Ok(())
}

pub fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::InProgress => "in_progress",
        RunStatus::Completed => "completed",
        RunStatus::CompletedWithErrors => "completed_with_errors",
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("========================================");
    if summary.dry_run {
        println!("DRY RUN {}", summary.migration_id);
        println!("  Would migrate: {}", summary.planned);
        println!("  Attempted:     {}", summary.attempted);
    } else {
        println!("Migration {}", summary.migration_id);
        println!("  Status:    {}", status_label(summary.status));
        println!("  Attempted: {}", summary.attempted);
        println!("  Uploaded:  {}", summary.uploads);
        println!("  Reused:    {}", summary.reused);
        println!(
            "  Ledger:    {} success, {} failed, {} skipped of {}",
            summary.stats.success, summary.stats.failed, summary.stats.skipped, summary.stats.total
        );
    }
    println!("========================================");
}

fn print_counts(title: &str, counts: &[ProviderCount]) {
    println!("{}:", title);
    for c in counts {
        println!(
            "  {:<20} {:>8}",
            c.provider.as_deref().unwrap_or("<none>"),
            c.count
        );
    }
}
