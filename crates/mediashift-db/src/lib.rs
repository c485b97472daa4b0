//! Mediashift Database Layer
//!
//! Relational store adapter over the content database: one query/transaction
//! interface for the embedded and the networked engine, plus the asset repository
//! used by the migration engine and the backup manager.

pub mod db;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use db::{
    dialect_for, AssetRepository, AssetRewrite, Database, DbTransaction, Dialect, SqlParam,
};
