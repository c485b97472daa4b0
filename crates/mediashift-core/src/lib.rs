//! Mediashift Core Library
//!
//! Domain models, error types, configuration and reporting hooks shared by every
//! Mediashift component.

pub mod config;
pub mod constants;
pub mod error;
pub mod hooks;
pub mod models;

// Re-export commonly used types
pub use config::{Config, DatabaseConfig, DestinationConfig, MigrationSettings};
pub use error::{AppError, LogLevel};
pub use hooks::{NoOpReporter, ProgressEvent, Reporter, TracingReporter};
pub use models::{
    AssetId, AssetRecord, DatabaseClient, FormatVariant, ProviderCount, RecordOutcome, RunStats,
    RunStatus, RunSummary,
};
