//! Error types module
//!
//! All failures surfaced by the migration tooling are unified under [`AppError`].
//! The variants mirror the operational taxonomy: setup failures (`StoreUnavailable`,
//! `InvalidEndpoint`, `Config`) abort a command before any work starts, while
//! per-record failures (`TransferFailed`, `ProbeFailed`) are downgraded by the engine
//! into ledger entries and never stop a run.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected outcomes such as a declined confirmation
    Debug,
    /// Per-record failures that the run absorbs
    Warn,
    /// Failures that terminate a command
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Relational store unavailable: {0}")]
    StoreUnavailable(String),

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Backup artifact missing: {0}")]
    BackupArtifactMissing(String),

    #[error("Restore aborted by user")]
    RestoreAborted,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable error code, stable across releases.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::TransferFailed(_) => "TRANSFER_FAILED",
            AppError::ProbeFailed(_) => "PROBE_FAILED",
            AppError::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            AppError::BackupArtifactMissing(_) => "BACKUP_ARTIFACT_MISSING",
            AppError::RestoreAborted => "RESTORE_ABORTED",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error must terminate the command instead of being recorded
    /// against a single asset.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AppError::TransferFailed(_)
                | AppError::ProbeFailed(_)
                | AppError::NotFound(_)
                | AppError::RestoreAborted
        )
    }

    pub fn log_level(&self) -> LogLevel {
        match self {
            AppError::RestoreAborted => LogLevel::Debug,
            AppError::TransferFailed(_) | AppError::ProbeFailed(_) | AppError::NotFound(_) => {
                LogLevel::Warn
            }
            _ => LogLevel::Error,
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_record_errors_are_not_fatal() {
        assert!(!AppError::TransferFailed("boom".into()).is_fatal());
        assert!(!AppError::ProbeFailed("503".into()).is_fatal());
        assert!(AppError::StoreUnavailable("refused".into()).is_fatal());
        assert!(AppError::InvalidEndpoint("ftp://x".into()).is_fatal());
        assert!(AppError::BackupArtifactMissing("report".into()).is_fatal());
    }

    #[test]
    fn restore_aborted_is_a_clean_exit() {
        let err = AppError::RestoreAborted;
        assert!(!err.is_fatal());
        assert_eq!(err.log_level(), LogLevel::Debug);
        assert_eq!(err.error_code(), "RESTORE_ABORTED");
    }

    #[test]
    fn io_errors_convert() {
        let err: AppError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.error_code(), "IO_ERROR");
        assert!(err.to_string().contains("gone"));
    }
}
