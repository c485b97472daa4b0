use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Primary key of an asset row.
pub type AssetId = i64;

/// Backing engine of the content database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseClient {
    Sqlite,
    Postgres,
}

impl FromStr for DatabaseClient {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "sqlite3" | "better-sqlite3" => Ok(DatabaseClient::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(DatabaseClient::Postgres),
            _ => Err(anyhow::anyhow!("Invalid database client: {}", s)),
        }
    }
}

impl Display for DatabaseClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DatabaseClient::Sqlite => write!(f, "sqlite"),
            DatabaseClient::Postgres => write!(f, "postgres"),
        }
    }
}

/// One media file row.
///
/// `url` and `provider` always agree: a row tagged with the destination provider
/// resolves at the destination store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub name: String,
    /// Content-derived identifier; together with `ext` it names the destination object.
    pub hash: String,
    /// File extension including the leading dot, e.g. `.png`.
    pub ext: String,
    pub mime: Option<String>,
    /// Size as stored by the CMS (kilobytes).
    pub size: Option<f64>,
    pub url: String,
    pub provider: Option<String>,
    pub formats: Option<JsonValue>,
    pub provider_metadata: Option<JsonValue>,
}

impl AssetRecord {
    pub fn content_type(&self) -> &str {
        self.mime
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or("application/octet-stream")
    }

    /// Rendition entries of the `formats` blob (thumbnail, small, ...).
    ///
    /// Entries without a `hash` or `url` are ignored; they cannot be addressed at the
    /// destination.
    pub fn format_variants(&self) -> Vec<FormatVariant> {
        let Some(JsonValue::Object(map)) = &self.formats else {
            return Vec::new();
        };

        let mut variants: Vec<FormatVariant> = map
            .iter()
            .filter_map(|(name, value)| {
                let hash = value.get("hash")?.as_str()?.to_string();
                let url = value.get("url")?.as_str()?.to_string();
                let ext = value
                    .get("ext")
                    .and_then(JsonValue::as_str)
                    .unwrap_or(&self.ext)
                    .to_string();
                let mime = value
                    .get("mime")
                    .and_then(JsonValue::as_str)
                    .map(String::from)
                    .or_else(|| self.mime.clone());
                Some(FormatVariant {
                    name: name.clone(),
                    hash,
                    ext,
                    mime,
                    url,
                })
            })
            .collect();
        variants.sort_by(|a, b| a.name.cmp(&b.name));
        variants
    }
}

/// A rendition stored alongside the original asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatVariant {
    pub name: String,
    pub hash: String,
    pub ext: String,
    pub mime: Option<String>,
    pub url: String,
}

impl FormatVariant {
    pub fn content_type(&self) -> &str {
        self.mime
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or("application/octet-stream")
    }
}

/// Number of rows carrying one provider tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCount {
    pub provider: Option<String>,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(formats: Option<JsonValue>) -> AssetRecord {
        AssetRecord {
            id: 1,
            name: "cat.png".to_string(),
            hash: "cat_abc".to_string(),
            ext: ".png".to_string(),
            mime: Some("image/png".to_string()),
            size: Some(12.5),
            url: "https://src.example/cat_abc.png".to_string(),
            provider: Some("cloudinary".to_string()),
            formats,
            provider_metadata: None,
        }
    }

    #[test]
    fn database_client_from_str() {
        assert_eq!(
            "sqlite".parse::<DatabaseClient>().unwrap(),
            DatabaseClient::Sqlite
        );
        assert_eq!(
            "PostgreSQL".parse::<DatabaseClient>().unwrap(),
            DatabaseClient::Postgres
        );
        assert!("mysql".parse::<DatabaseClient>().is_err());
        assert_eq!(DatabaseClient::Postgres.to_string(), "postgres");
    }

    #[test]
    fn content_type_falls_back_to_octet_stream() {
        let mut r = record(None);
        assert_eq!(r.content_type(), "image/png");
        r.mime = Some(String::new());
        assert_eq!(r.content_type(), "application/octet-stream");
        r.mime = None;
        assert_eq!(r.content_type(), "application/octet-stream");
    }

    #[test]
    fn format_variants_are_sorted_and_inherit_fields() {
        let r = record(Some(json!({
            "thumbnail": {"hash": "thumbnail_cat_abc", "url": "https://src.example/t.png"},
            "small": {"hash": "small_cat_abc", "ext": ".webp", "mime": "image/webp", "url": "https://src.example/s.webp"},
            "broken": {"url": "https://src.example/b.png"}
        })));

        let variants = r.format_variants();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].name, "small");
        assert_eq!(variants[0].ext, ".webp");
        assert_eq!(variants[0].content_type(), "image/webp");
        assert_eq!(variants[1].name, "thumbnail");
        assert_eq!(variants[1].ext, ".png");
        assert_eq!(variants[1].content_type(), "image/png");
    }

    #[test]
    fn format_variants_empty_for_non_object() {
        assert!(record(None).format_variants().is_empty());
        assert!(record(Some(json!("garbage"))).format_variants().is_empty());
    }
}
