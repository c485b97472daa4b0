//! Mediashift CLI: back up, migrate and restore media asset references.
//!
//! Settings come from `.env.<env>`, `.env` and the process environment.

use clap::{Parser, Subcommand};
use mediashift_cli::commands::{self, BackupArgs, MigrateArgs, RestoreArgs, StatusArgs};
use mediashift_cli::{exit_code, init_tracing};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mediashift", about = "Move media assets between object stores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot the database and export the source-provider records
    Backup(BackupArgs),
    /// Copy source-provider assets to the destination and rewrite their rows
    Migrate(MigrateArgs),
    /// Restore the database from a backup snapshot
    Restore(RestoreArgs),
    /// Show the migration ledger and per-provider record counts
    Status(StatusArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Backup(args) => commands::backup(args).await,
        Commands::Migrate(args) => commands::migrate(args).await,
        Commands::Restore(args) => commands::restore(args).await,
        Commands::Status(args) => commands::status(args).await,
    };
    exit_code(result)
}
