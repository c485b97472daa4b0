//! Domain models shared by the adapter, the engine and the backup manager.

pub mod asset;
pub mod outcome;

pub use asset::{AssetId, AssetRecord, DatabaseClient, FormatVariant, ProviderCount};
pub use outcome::{RecordOutcome, RunStats, RunStatus, RunSummary};
