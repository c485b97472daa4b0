//! Mediashift Backup Library
//!
//! Point-in-time snapshots taken before a migration touches anything, and the
//! restore path that reverses them.
//!
//! # Artifact layout
//!
//! Every invocation writes four files sharing one timestamp token
//! (`%Y-%m-%dT%H-%M-%S`), which is how [`BackupManager::list_backups`] groups them:
//!
//! - `database-{ts}.db` (embedded engine) or `database-{ts}.dump` (networked engine)
//! - `files-{ts}.json`
//! - `mapping-{ts}.csv`
//! - `report-{ts}.txt`

pub mod confirm;
pub mod manager;

pub use confirm::{AssumeYes, Confirm, StdinConfirm};
pub use manager::{BackupInfo, BackupManager, BackupSet, RestoreReport};
