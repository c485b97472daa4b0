//! Mediashift Storage Library
//!
//! Transfer side of the migration: the [`DestinationStore`] trait with its
//! S3-compatible implementation, and the [`SourceFetcher`] used to probe and
//! download assets from the provider being migrated away from.
//!
//! # Destination key format
//!
//! Keys are content-addressed: `{hash}{ext}`, e.g. `abc123.png`. Two records that
//! share a hash and extension map to the same object. Key generation lives in the
//! `keys` module so every caller stays consistent.

pub mod keys;
pub mod r2;
pub mod source;
pub mod traits;

// Re-export commonly used types
pub use keys::asset_key;
pub use r2::{public_url, R2Storage};
pub use source::{resolve_source_url, HttpSource, SourceFetcher, SourceProbe};
pub use traits::{DestinationStore, StorageError, StorageResult};
