//! Mediashift Migration Engine
//!
//! Moves every asset still tagged with the source provider to the destination
//! store and rewrites its row, one transaction per record. Progress is kept in a
//! JSON ledger so an interrupted run resumes where it stopped.

pub mod engine;
pub mod state;

pub use engine::MigrationEngine;
pub use state::{FailedEntry, MigrationState, ProcessedEntry, SkippedEntry, StateStore};
