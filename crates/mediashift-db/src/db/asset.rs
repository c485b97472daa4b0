use mediashift_core::{AppError, AssetId, AssetRecord, ProviderCount};
use serde_json::Value as JsonValue;
use sqlx::any::AnyRow;
use sqlx::Row;

use super::connection::{Database, SqlParam};
use super::transaction::DbTransaction;

/// New destination values for one asset row.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRewrite {
    pub url: String,
    pub provider: String,
    pub provider_metadata: JsonValue,
    /// Rewritten renditions blob; `None` leaves the column untouched.
    pub formats: Option<JsonValue>,
}

/// Asset table repository
///
/// Every backend difference is delegated to the database dialect, so the
/// statements below are written once.
#[derive(Clone)]
pub struct AssetRepository {
    db: Database,
    table: String,
}

impl AssetRepository {
    /// Repository over `table`. The name is interpolated into SQL and must be a
    /// plain identifier.
    pub fn new(db: Database, table: &str) -> Result<Self, AppError> {
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(AppError::Config(format!("Invalid table name: {}", table)));
        }
        Ok(Self {
            db,
            table: table.to_string(),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn select_columns(&self) -> String {
        let d = self.db.dialect();
        [
            d.integer("id"),
            "name".to_string(),
            "hash".to_string(),
            "ext".to_string(),
            "mime".to_string(),
            d.real("size"),
            "url".to_string(),
            "provider".to_string(),
            d.text("formats"),
            d.text("provider_metadata"),
        ]
        .join(", ")
    }

    fn quoted_table(&self) -> String {
        self.db.dialect().quote_ident(&self.table)
    }

    /// All rows tagged with `provider`, ordered by id.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_provider(&self, provider: &str) -> Result<Vec<AssetRecord>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE provider = {} ORDER BY id",
            self.select_columns(),
            self.quoted_table(),
            self.db.dialect().placeholder(1)
        );
        let rows = self.db.query_all(&sql, &[provider.into()]).await?;
        rows.iter().map(row_to_asset).collect()
    }

    pub async fn get_by_id(&self, id: AssetId) -> Result<Option<AssetRecord>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = {}",
            self.select_columns(),
            self.quoted_table(),
            self.db.dialect().placeholder(1)
        );
        let row = self.db.query_one(&sql, &[id.into()]).await?;
        row.as_ref().map(row_to_asset).transpose()
    }

    pub async fn count_by_provider(&self, provider: &str) -> Result<i64, AppError> {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM {} WHERE provider = {}",
            self.quoted_table(),
            self.db.dialect().placeholder(1)
        );
        let row = self.db.query_one(&sql, &[provider.into()]).await?;
        match row {
            Some(row) => Ok(row.try_get::<i64, _>("count")?),
            None => Ok(0),
        }
    }

    /// Row counts grouped by provider tag, ordered by tag.
    pub async fn provider_counts(&self) -> Result<Vec<ProviderCount>, AppError> {
        let sql = format!(
            "SELECT provider, COUNT(*) AS count FROM {} GROUP BY provider ORDER BY provider",
            self.quoted_table()
        );
        let rows = self.db.query_all(&sql, &[]).await?;
        rows.iter()
            .map(|row| {
                Ok(ProviderCount {
                    provider: row.try_get::<Option<String>, _>("provider")?,
                    count: row.try_get::<i64, _>("count")?,
                })
            })
            .collect()
    }

    /// Point one row at the destination inside the caller's transaction.
    ///
    /// Fails with [`AppError::NotFound`] when no row matched, so the caller rolls back.
    pub async fn rewrite_to_destination(
        &self,
        tx: &mut DbTransaction,
        id: AssetId,
        rewrite: &AssetRewrite,
    ) -> Result<(), AppError> {
        let d = self.db.dialect();
        let mut assignments = vec![
            format!("url = {}", d.placeholder(1)),
            format!("provider = {}", d.placeholder(2)),
            format!("provider_metadata = {}", d.json_placeholder(3)),
            format!("updated_at = {}", d.now()),
        ];
        let mut params: Vec<SqlParam> = vec![
            rewrite.url.clone().into(),
            rewrite.provider.clone().into(),
            rewrite.provider_metadata.to_string().into(),
            id.into(),
        ];
        if let Some(formats) = &rewrite.formats {
            assignments.push(format!("formats = {}", d.json_placeholder(5)));
            params.push(formats.to_string().into());
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE id = {}",
            self.quoted_table(),
            assignments.join(", "),
            d.placeholder(4)
        );
        let affected = tx.execute(&sql, &params).await?;
        if affected == 0 {
            return Err(AppError::NotFound(format!("Asset {} not found", id)));
        }

        tracing::debug!(record_id = id, provider = %rewrite.provider, "Asset row rewritten");
        Ok(())
    }
}

fn parse_json_column(raw: Option<String>, id: AssetId, column: &str) -> Option<JsonValue> {
    let raw = raw.filter(|s| !s.trim().is_empty())?;
    match serde_json::from_str::<JsonValue>(&raw) {
        Ok(JsonValue::Null) => None,
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(record_id = id, column = %column, error = %e, "Ignoring unparsable json column");
            None
        }
    }
}

fn row_to_asset(row: &AnyRow) -> Result<AssetRecord, AppError> {
    let id: i64 = row.try_get("id")?;
    Ok(AssetRecord {
        id,
        name: row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
        hash: row.try_get::<Option<String>, _>("hash")?.unwrap_or_default(),
        ext: row.try_get::<Option<String>, _>("ext")?.unwrap_or_default(),
        mime: row.try_get("mime")?,
        size: row.try_get("size")?,
        url: row.try_get::<Option<String>, _>("url")?.unwrap_or_default(),
        provider: row.try_get("provider")?,
        formats: parse_json_column(row.try_get("formats")?, id, "formats"),
        provider_metadata: parse_json_column(
            row.try_get("provider_metadata")?,
            id,
            "provider_metadata",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{insert_asset, sample_asset, setup_sqlite};
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn rejects_unsafe_table_names() {
        let dir = tempdir().unwrap();
        let repo = setup_sqlite(dir.path()).await;
        let db = repo.database().clone();
        assert!(AssetRepository::new(db.clone(), "files; DROP TABLE x").is_err());
        assert!(AssetRepository::new(db.clone(), "").is_err());
        assert!(AssetRepository::new(db, "upload_files").is_ok());
    }

    #[tokio::test]
    async fn list_by_provider_orders_by_id() {
        let dir = tempdir().unwrap();
        let repo = setup_sqlite(dir.path()).await;
        insert_asset(repo.database(), &sample_asset(3, "c", "cloudinary")).await;
        insert_asset(repo.database(), &sample_asset(1, "a", "cloudinary")).await;
        insert_asset(repo.database(), &sample_asset(2, "b", "aws-s3")).await;

        let assets = repo.list_by_provider("cloudinary").await.unwrap();
        let ids: Vec<_> = assets.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(assets[0].hash, "a");
        assert_eq!(assets[0].ext, ".png");
    }

    #[tokio::test]
    async fn get_by_id_and_counts() {
        let dir = tempdir().unwrap();
        let repo = setup_sqlite(dir.path()).await;
        insert_asset(repo.database(), &sample_asset(1, "a", "cloudinary")).await;
        insert_asset(repo.database(), &sample_asset(2, "b", "cloudinary")).await;
        insert_asset(repo.database(), &sample_asset(3, "c", "aws-s3")).await;

        let found = repo.get_by_id(2).await.unwrap().unwrap();
        assert_eq!(found.hash, "b");
        assert!(repo.get_by_id(99).await.unwrap().is_none());

        assert_eq!(repo.count_by_provider("cloudinary").await.unwrap(), 2);
        assert_eq!(repo.count_by_provider("nobody").await.unwrap(), 0);

        let counts = repo.provider_counts().await.unwrap();
        assert_eq!(
            counts,
            vec![
                ProviderCount {
                    provider: Some("aws-s3".to_string()),
                    count: 1
                },
                ProviderCount {
                    provider: Some("cloudinary".to_string()),
                    count: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn rewrite_updates_row_on_commit() {
        let dir = tempdir().unwrap();
        let repo = setup_sqlite(dir.path()).await;
        let mut asset = sample_asset(1, "abc", "cloudinary");
        asset.formats = Some(json!({"thumbnail": {"hash": "thumbnail_abc", "url": "http://src/t.png"}}));
        insert_asset(repo.database(), &asset).await;

        let rewrite = AssetRewrite {
            url: "https://cdn.example/abc.png".to_string(),
            provider: "aws-s3".to_string(),
            provider_metadata: json!({"key": "abc.png"}),
            formats: Some(json!({"thumbnail": {"hash": "thumbnail_abc", "url": "https://cdn.example/thumbnail_abc.png"}})),
        };
        let mut tx = repo.database().begin().await.unwrap();
        repo.rewrite_to_destination(&mut tx, 1, &rewrite)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let updated = repo.get_by_id(1).await.unwrap().unwrap();
        assert_eq!(updated.url, "https://cdn.example/abc.png");
        assert_eq!(updated.provider.as_deref(), Some("aws-s3"));
        assert_eq!(updated.provider_metadata, Some(json!({"key": "abc.png"})));
        assert_eq!(
            updated.formats.unwrap()["thumbnail"]["url"],
            "https://cdn.example/thumbnail_abc.png"
        );
    }

    #[tokio::test]
    async fn rewrite_is_discarded_on_rollback() {
        let dir = tempdir().unwrap();
        let repo = setup_sqlite(dir.path()).await;
        insert_asset(repo.database(), &sample_asset(1, "abc", "cloudinary")).await;

        let rewrite = AssetRewrite {
            url: "https://cdn.example/abc.png".to_string(),
            provider: "aws-s3".to_string(),
            provider_metadata: json!({}),
            formats: None,
        };
        let mut tx = repo.database().begin().await.unwrap();
        repo.rewrite_to_destination(&mut tx, 1, &rewrite)
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let unchanged = repo.get_by_id(1).await.unwrap().unwrap();
        assert_eq!(unchanged.provider.as_deref(), Some("cloudinary"));
        assert_eq!(unchanged.url, "http://src/abc.png");
    }

    #[tokio::test]
    async fn rewrite_of_missing_row_is_not_found() {
        let dir = tempdir().unwrap();
        let repo = setup_sqlite(dir.path()).await;
        let rewrite = AssetRewrite {
            url: "u".to_string(),
            provider: "aws-s3".to_string(),
            provider_metadata: json!({}),
            formats: None,
        };
        let mut tx = repo.database().begin().await.unwrap();
        let result = repo.rewrite_to_destination(&mut tx, 42, &rewrite).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn unparsable_json_is_ignored() {
        let dir = tempdir().unwrap();
        let repo = setup_sqlite(dir.path()).await;
        insert_asset(repo.database(), &sample_asset(1, "abc", "cloudinary")).await;
        repo.database()
            .execute(
                "UPDATE files SET formats = ?1 WHERE id = ?2",
                &["{not json".into(), 1_i64.into()],
            )
            .await
            .unwrap();

        let asset = repo.get_by_id(1).await.unwrap().unwrap();
        assert!(asset.formats.is_none());
    }
}
