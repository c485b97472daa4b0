use clap::Parser;
use mediashift_cli::commands::{self, RestoreArgs};
use mediashift_cli::{exit_code, init_tracing};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "restore_assets")]
#[command(about = "Restore the database from a backup snapshot")]
struct Args {
    #[command(flatten)]
    inner: RestoreArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    exit_code(commands::restore(args.inner).await)
}
