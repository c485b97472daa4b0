use clap::Parser;
use mediashift_cli::commands::{self, BackupArgs};
use mediashift_cli::{exit_code, init_tracing};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "backup_assets")]
#[command(about = "Snapshot the database and export the records awaiting migration")]
struct Args {
    #[command(flatten)]
    inner: BackupArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    exit_code(commands::backup(args.inner).await)
}
