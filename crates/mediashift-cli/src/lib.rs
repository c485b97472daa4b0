//! Command-line entry points for backing up, migrating and restoring media assets.

pub mod commands;

use mediashift_core::AppError;
use std::process::ExitCode;

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Map a command result to the process exit code.
pub fn exit_code(result: anyhow::Result<()>) -> ExitCode {
    ExitCode::from(exit_status(&result))
}

/// Partial migration failures are already `Ok`; a declined restore is not an error.
pub fn exit_status(result: &anyhow::Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) if is_aborted(e) => {
            println!("Restore cancelled; nothing was changed.");
            0
        }
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

fn is_aborted(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<AppError>(), Some(AppError::RestoreAborted))
}
