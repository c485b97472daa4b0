//! SQL dialect strategies
//!
//! The two supported engines differ in placeholder syntax, the "now" function and
//! the casts needed to read json/numeric columns through the driver-agnostic row
//! type. Callers build statements through a [`Dialect`] and never branch on the
//! backend themselves.

use mediashift_core::DatabaseClient;
use std::sync::Arc;

pub trait Dialect: Send + Sync {
    fn client(&self) -> DatabaseClient;

    /// Positional placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Placeholder for a parameter written into a json column.
    fn json_placeholder(&self, index: usize) -> String {
        self.placeholder(index)
    }

    /// Expression yielding the current timestamp.
    fn now(&self) -> &'static str;

    /// Select expression reading `column` as a 64-bit integer.
    fn integer(&self, column: &str) -> String;

    /// Select expression reading `column` as a double.
    fn real(&self, column: &str) -> String;

    /// Select expression reading `column` (including json) as text.
    fn text(&self, column: &str) -> String;

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

/// Embedded file-based engine.
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn client(&self) -> DatabaseClient {
        DatabaseClient::Sqlite
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    fn now(&self) -> &'static str {
        "datetime('now')"
    }

    fn integer(&self, column: &str) -> String {
        format!("CAST({} AS INTEGER) AS {}", column, column)
    }

    fn real(&self, column: &str) -> String {
        format!("CAST({} AS REAL) AS {}", column, column)
    }

    fn text(&self, column: &str) -> String {
        format!("CAST({} AS TEXT) AS {}", column, column)
    }
}

/// Networked client/server engine.
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn client(&self) -> DatabaseClient {
        DatabaseClient::Postgres
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn json_placeholder(&self, index: usize) -> String {
        format!("${}::jsonb", index)
    }

    fn now(&self) -> &'static str {
        "NOW()"
    }

    fn integer(&self, column: &str) -> String {
        format!("{}::bigint AS {}", column, column)
    }

    fn real(&self, column: &str) -> String {
        format!("{}::double precision AS {}", column, column)
    }

    fn text(&self, column: &str) -> String {
        format!("{}::text AS {}", column, column)
    }
}

pub fn dialect_for(client: DatabaseClient) -> Arc<dyn Dialect> {
    match client {
        DatabaseClient::Sqlite => Arc::new(SqliteDialect),
        DatabaseClient::Postgres => Arc::new(PostgresDialect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_differ_per_backend() {
        assert_eq!(SqliteDialect.placeholder(3), "?3");
        assert_eq!(PostgresDialect.placeholder(3), "$3");
        assert_eq!(SqliteDialect.json_placeholder(2), "?2");
        assert_eq!(PostgresDialect.json_placeholder(2), "$2::jsonb");
    }

    #[test]
    fn now_function_per_backend() {
        assert_eq!(SqliteDialect.now(), "datetime('now')");
        assert_eq!(PostgresDialect.now(), "NOW()");
    }

    #[test]
    fn casts_keep_column_alias() {
        assert_eq!(SqliteDialect.integer("id"), "CAST(id AS INTEGER) AS id");
        assert_eq!(PostgresDialect.text("formats"), "formats::text AS formats");
        assert_eq!(PostgresDialect.real("size"), "size::double precision AS size");
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(SqliteDialect.quote_ident("files"), "\"files\"");
        assert_eq!(PostgresDialect.quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn dialect_for_matches_client() {
        assert_eq!(
            dialect_for(DatabaseClient::Sqlite).client(),
            DatabaseClient::Sqlite
        );
        assert_eq!(
            dialect_for(DatabaseClient::Postgres).client(),
            DatabaseClient::Postgres
        );
    }
}
