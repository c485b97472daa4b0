//! Fixtures for tests: an embedded asset table and sample rows.

use mediashift_core::{AssetId, AssetRecord, DatabaseConfig};
use std::path::Path;

use crate::db::{AssetRepository, Database};

/// Asset table layout of the content database, embedded-engine flavour.
pub const SQLITE_ASSET_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    name TEXT,
    hash TEXT,
    ext TEXT,
    mime TEXT,
    size REAL,
    url TEXT,
    provider TEXT,
    formats TEXT,
    provider_metadata TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT
)";

/// Settings for an embedded database file inside `dir`, created on first connect.
pub fn sqlite_config(dir: &Path) -> DatabaseConfig {
    let mut config = DatabaseConfig::sqlite(dir.join("data.db"));
    config.create_if_missing = true;
    config
}

/// Create `data.db` in `dir` with the asset table and return a repository over it.
pub async fn setup_sqlite(dir: &Path) -> AssetRepository {
    let db = Database::connect(&sqlite_config(dir))
        .await
        .expect("connect to test database");
    db.execute(SQLITE_ASSET_SCHEMA, &[])
        .await
        .expect("create asset table");
    AssetRepository::new(db, "files").expect("valid table")
}

pub fn sample_asset(id: AssetId, hash: &str, provider: &str) -> AssetRecord {
    AssetRecord {
        id,
        name: format!("{}.png", hash),
        hash: hash.to_string(),
        ext: ".png".to_string(),
        mime: Some("image/png".to_string()),
        size: Some(1.5),
        url: format!("http://src/{}.png", hash),
        provider: Some(provider.to_string()),
        formats: None,
        provider_metadata: None,
    }
}

pub async fn insert_asset(db: &Database, asset: &AssetRecord) {
    db.execute(
        "INSERT INTO files (id, name, hash, ext, mime, size, url, provider, formats, provider_metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        &[
            asset.id.into(),
            asset.name.clone().into(),
            asset.hash.clone().into(),
            asset.ext.clone().into(),
            asset.mime.clone().into(),
            asset.size.into(),
            asset.url.clone().into(),
            asset.provider.clone().into(),
            asset.formats.as_ref().map(|f| f.to_string()).into(),
            asset.provider_metadata.as_ref().map(|m| m.to_string()).into(),
        ],
    )
    .await
    .expect("insert asset");
}
