//! Database access layer
//!
//! `connection` holds the backend-agnostic adapter, `dialect` the per-backend SQL
//! strategies, `transaction` the per-caller transaction handle, and `asset` the
//! repository over the media table.

pub mod asset;
pub mod connection;
pub mod dialect;
pub mod transaction;

pub use asset::{AssetRepository, AssetRewrite};
pub use connection::{Database, SqlParam};
pub use dialect::{dialect_for, Dialect, PostgresDialect, SqliteDialect};
pub use transaction::DbTransaction;
