//! Relational store adapter
//!
//! [`Database`] wraps a driver-agnostic connection pool over either backend and
//! exposes a uniform query/transaction surface. Statements are plain SQL built
//! through the pool's [`Dialect`]; parameters travel as [`SqlParam`].

use mediashift_core::{AppError, DatabaseClient, DatabaseConfig};
use sqlx::any::{install_default_drivers, AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool};
use std::sync::Arc;
use std::time::Duration;

use super::dialect::{dialect_for, Dialect};
use super::transaction::DbTransaction;

/// A bindable statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::Real(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

pub(crate) fn bind_params<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: &[SqlParam],
) -> Query<'q, Any, AnyArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Real(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.clone()),
        };
    }
    query
}

/// Connection pool over one of the two supported backends.
///
/// Cloning is cheap; clones share the pool. Every transaction checks out its own
/// connection, so concurrent workers never share a transaction handle.
#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
    dialect: Arc<dyn Dialect>,
}

impl Database {
    /// Connect to the backend selected by `config.client`.
    ///
    /// Any failure to open or ping the store is reported as
    /// [`AppError::StoreUnavailable`].
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        install_default_drivers();

        let url = config
            .connection_url()
            .map_err(|e| AppError::Config(e.to_string()))?;

        tracing::info!(client = %config.client, "Connecting to database...");
        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.timeout_seconds))
            .connect(&url)
            .await
            .map_err(|e| {
                tracing::error!(client = %config.client, error = %e, "Database connection failed");
                AppError::StoreUnavailable(e.to_string())
            })?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        tracing::info!(
            client = %config.client,
            max_connections = config.max_connections,
            "Database connected successfully"
        );

        Ok(Self {
            pool,
            dialect: dialect_for(config.client),
        })
    }

    pub fn client(&self) -> DatabaseClient {
        self.dialect.client()
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub async fn query_all(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<AnyRow>, AppError> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn query_one(&self, sql: &str, params: &[SqlParam]) -> Result<Option<AnyRow>, AppError> {
        let row = bind_params(sqlx::query(sql), params)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64, AppError> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Begin a transaction on a dedicated connection.
    pub async fn begin(&self) -> Result<DbTransaction, AppError> {
        let transaction = self.pool.begin().await?;
        Ok(DbTransaction::new(transaction))
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Database pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;
    use tempfile::tempdir;

    async fn open_temp(dir: &std::path::Path) -> Database {
        let mut config = DatabaseConfig::sqlite(dir.join("store.db"));
        config.create_if_missing = true;
        Database::connect(&config).await.unwrap()
    }

    #[test]
    fn option_params_become_null() {
        assert_eq!(SqlParam::from(None::<String>), SqlParam::Null);
        assert_eq!(SqlParam::from(Some(4_i64)), SqlParam::Int(4));
        assert_eq!(SqlParam::from("x"), SqlParam::Text("x".to_string()));
    }

    #[tokio::test]
    async fn connect_to_missing_file_is_store_unavailable() {
        let dir = tempdir().unwrap();
        let config = DatabaseConfig::sqlite(dir.path().join("missing/nothing.db"));
        let result = Database::connect(&config).await;
        assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn execute_and_query_roundtrip() {
        let dir = tempdir().unwrap();
        let db = open_temp(dir.path()).await;
        assert_eq!(db.client(), DatabaseClient::Sqlite);

        db.execute("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER)", &[])
            .await
            .unwrap();
        let affected = db
            .execute(
                "INSERT INTO kv (k, v) VALUES (?1, ?2), (?3, ?4)",
                &["a".into(), 1_i64.into(), "b".into(), 2_i64.into()],
            )
            .await
            .unwrap();
        assert_eq!(affected, 2);

        let rows = db
            .query_all("SELECT k, v FROM kv ORDER BY k", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].try_get::<String, _>("k").unwrap(), "b");

        let missing = db
            .query_one("SELECT k FROM kv WHERE k = ?1", &["zzz".into()])
            .await
            .unwrap();
        assert!(missing.is_none());
        db.close().await;
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let dir = tempdir().unwrap();
        let db = open_temp(dir.path()).await;
        db.execute("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER)", &[])
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        tx.execute("INSERT INTO kv (k, v) VALUES (?1, ?2)", &["a".into(), 1_i64.into()])
            .await
            .unwrap();
        // A failing statement leaves the transaction usable for rollback.
        assert!(tx.execute("INSERT INTO nope VALUES (1)", &[]).await.is_err());
        tx.rollback().await.unwrap();

        let row = db
            .query_one("SELECT COUNT(*) AS n FROM kv", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.try_get::<i64, _>("n").unwrap(), 0);
    }

    #[tokio::test]
    async fn commit_persists_writes() {
        let dir = tempdir().unwrap();
        let db = open_temp(dir.path()).await;
        db.execute("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER)", &[])
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        tx.execute("INSERT INTO kv (k, v) VALUES (?1, ?2)", &["a".into(), 7_i64.into()])
            .await
            .unwrap();
        let inside = tx
            .query_one("SELECT v FROM kv WHERE k = ?1", &["a".into()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inside.try_get::<i64, _>("v").unwrap(), 7);
        tx.commit().await.unwrap();

        let rows = db.query_all("SELECT v FROM kv", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
