use clap::Parser;
use mediashift_cli::commands::{self, MigrateArgs};
use mediashift_cli::{exit_code, init_tracing};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "migrate_assets")]
#[command(about = "Copy source-provider assets to the destination bucket and rewrite their rows")]
struct Args {
    #[command(flatten)]
    inner: MigrateArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    if args.inner.dry_run {
        tracing::info!("Dry run: no objects are uploaded and no rows are changed");
    }
    exit_code(commands::migrate(args.inner).await)
}
