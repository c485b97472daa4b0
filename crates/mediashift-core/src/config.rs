//! Configuration module
//!
//! Settings are read from the process environment after loading
//! `.env.<environment>` and `.env` (whichever exist). Every setting has a default
//! except the destination credentials, which only the migrate command requires.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;
use crate::models::DatabaseClient;

const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the content database.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub client: DatabaseClient,
    /// Database file for the embedded engine.
    pub filename: PathBuf,
    /// Connection url for the networked engine.
    pub url: Option<String>,
    /// Table holding one row per media file.
    pub table: String,
    pub max_connections: u32,
    pub timeout_seconds: u64,
    /// Create the embedded database file when it does not exist (tests, fresh setups).
    pub create_if_missing: bool,
}

impl DatabaseConfig {
    /// Embedded-engine settings pointing at `filename`.
    pub fn sqlite(filename: impl Into<PathBuf>) -> Self {
        Self {
            client: DatabaseClient::Sqlite,
            filename: filename.into(),
            url: None,
            table: DEFAULT_ASSET_TABLE.to_string(),
            max_connections: MAX_CONNECTIONS,
            timeout_seconds: CONNECTION_TIMEOUT_SECS,
            create_if_missing: false,
        }
    }

    /// Networked-engine settings for `url`.
    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            client: DatabaseClient::Postgres,
            filename: PathBuf::from(DEFAULT_SQLITE_FILENAME),
            url: Some(url.into()),
            table: DEFAULT_ASSET_TABLE.to_string(),
            max_connections: MAX_CONNECTIONS,
            timeout_seconds: CONNECTION_TIMEOUT_SECS,
            create_if_missing: false,
        }
    }

    /// Url understood by the driver for the configured client.
    pub fn connection_url(&self) -> Result<String, anyhow::Error> {
        match self.client {
            DatabaseClient::Sqlite => {
                let mut url = format!("sqlite://{}", self.filename.display());
                if self.create_if_missing {
                    url.push_str("?mode=rwc");
                }
                Ok(url)
            }
            DatabaseClient::Postgres => self
                .url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for postgres")),
        }
    }

    fn from_env() -> Result<Self, anyhow::Error> {
        let client: DatabaseClient = env::var("DATABASE_CLIENT")
            .unwrap_or_else(|_| "sqlite".to_string())
            .parse()?;

        let filename = PathBuf::from(
            env::var("DATABASE_FILENAME").unwrap_or_else(|_| DEFAULT_SQLITE_FILENAME.to_string()),
        );

        let url = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(url),
            _ if client == DatabaseClient::Postgres => Some(postgres_url_from_parts()?),
            _ => None,
        };

        Ok(Self {
            client,
            filename,
            url,
            table: env::var("DATABASE_TABLE").unwrap_or_else(|_| DEFAULT_ASSET_TABLE.to_string()),
            max_connections: parse_env("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            timeout_seconds: parse_env("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            create_if_missing: false,
        })
    }
}

fn postgres_url_from_parts() -> Result<String, anyhow::Error> {
    let host = env::var("DATABASE_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port: u16 = env::var("DATABASE_PORT")
        .unwrap_or_else(|_| "5432".to_string())
        .parse()
        .map_err(|_| anyhow::anyhow!("DATABASE_PORT must be a valid number"))?;
    let name = env::var("DATABASE_NAME")
        .map_err(|_| anyhow::anyhow!("DATABASE_NAME or DATABASE_URL must be set for postgres"))?;
    let user = env::var("DATABASE_USERNAME").unwrap_or_else(|_| "postgres".to_string());
    let password = env::var("DATABASE_PASSWORD").unwrap_or_default();
    let ssl = parse_env("DATABASE_SSL", false);

    let mut url = if password.is_empty() {
        format!("postgres://{}@{}:{}/{}", user, host, port, name)
    } else {
        format!("postgres://{}:{}@{}:{}/{}", user, password, host, port, name)
    };
    if ssl {
        url.push_str("?sslmode=require");
    }
    Ok(url)
}

/// Settings of the S3-compatible destination bucket.
#[derive(Clone)]
pub struct DestinationConfig {
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub region: String,
    /// Custom public domain serving the bucket, e.g. `cdn.example.com`.
    pub public_domain: Option<String>,
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &"***")
            .field("secret_access_key", &"***")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("public_domain", &self.public_domain)
            .finish()
    }
}

impl DestinationConfig {
    /// Returns `None` when no destination variable is set at all, and an error when
    /// only some of them are.
    fn from_env() -> Result<Option<Self>, anyhow::Error> {
        let endpoint = env::var("R2_ENDPOINT").ok();
        let access_key_id = env::var("R2_ACCESS_KEY_ID").ok();
        let secret_access_key = env::var("R2_SECRET_ACCESS_KEY").ok();
        let bucket = env::var("R2_BUCKET").ok();

        if endpoint.is_none()
            && access_key_id.is_none()
            && secret_access_key.is_none()
            && bucket.is_none()
        {
            return Ok(None);
        }

        let missing = |name: &str| anyhow::anyhow!("{} must be set", name);
        Ok(Some(Self {
            endpoint: endpoint.ok_or_else(|| missing("R2_ENDPOINT"))?,
            access_key_id: access_key_id.ok_or_else(|| missing("R2_ACCESS_KEY_ID"))?,
            secret_access_key: secret_access_key.ok_or_else(|| missing("R2_SECRET_ACCESS_KEY"))?,
            bucket: bucket.ok_or_else(|| missing("R2_BUCKET"))?,
            region: env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_domain: env::var("R2_PUBLIC_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }))
    }
}

/// Tunables of the migration engine.
#[derive(Clone, Debug)]
pub struct MigrationSettings {
    pub concurrency: usize,
    pub state_file: PathBuf,
    pub source_provider: String,
    pub destination_provider: String,
    /// Base used to resolve relative record urls such as `/uploads/a.png`.
    pub source_base_url: Option<String>,
    pub probe_timeout: Duration,
    pub download_timeout: Duration,
    pub max_attempts: u32,
    /// Delay before retry `n` is `retry_base_delay * n`.
    pub retry_base_delay: Duration,
    pub max_asset_bytes: u64,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            source_provider: DEFAULT_SOURCE_PROVIDER.to_string(),
            destination_provider: DEFAULT_DESTINATION_PROVIDER.to_string(),
            source_base_url: None,
            probe_timeout: Duration::from_secs(DEFAULT_SOURCE_PROBE_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            max_attempts: DEFAULT_DOWNLOAD_MAX_ATTEMPTS,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            max_asset_bytes: megabytes(DEFAULT_MAX_ASSET_SIZE_MB),
        }
    }
}

impl MigrationSettings {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: parse_env("MIGRATION_CONCURRENCY", DEFAULT_CONCURRENCY),
            state_file: env::var("MIGRATION_STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_file),
            source_provider: env::var("SOURCE_PROVIDER").unwrap_or(defaults.source_provider),
            destination_provider: env::var("DESTINATION_PROVIDER")
                .unwrap_or(defaults.destination_provider),
            source_base_url: env::var("SOURCE_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            probe_timeout: Duration::from_secs(parse_env(
                "SOURCE_PROBE_TIMEOUT_SECS",
                DEFAULT_SOURCE_PROBE_TIMEOUT_SECS,
            )),
            download_timeout: Duration::from_secs(parse_env(
                "DOWNLOAD_TIMEOUT_SECS",
                DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            )),
            max_attempts: parse_env("DOWNLOAD_MAX_ATTEMPTS", DEFAULT_DOWNLOAD_MAX_ATTEMPTS),
            retry_base_delay: Duration::from_millis(parse_env(
                "RETRY_BASE_DELAY_MS",
                DEFAULT_RETRY_BASE_DELAY_MS,
            )),
            max_asset_bytes: megabytes(parse_env("MAX_ASSET_SIZE_MB", DEFAULT_MAX_ASSET_SIZE_MB)),
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.concurrency == 0 {
            anyhow::bail!("MIGRATION_CONCURRENCY must be at least 1");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("DOWNLOAD_MAX_ATTEMPTS must be at least 1");
        }
        if self.max_asset_bytes == 0 {
            anyhow::bail!("MAX_ASSET_SIZE_MB must be at least 1");
        }
        if self.source_provider == self.destination_provider {
            anyhow::bail!(
                "SOURCE_PROVIDER and DESTINATION_PROVIDER must differ (both are '{}')",
                self.source_provider
            );
        }
        Ok(())
    }
}

/// Application configuration shared by the backup, migrate and restore commands.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub database: DatabaseConfig,
    pub destination: Option<DestinationConfig>,
    pub migration: MigrationSettings,
    pub backup_dir: PathBuf,
}

impl Config {
    /// Load `.env.<environment>` then `.env`, and read settings from the environment.
    /// Variables already present in the process win over both files.
    pub fn from_env(environment: &str) -> Result<Self, anyhow::Error> {
        let env_file = format!(".env.{}", environment);
        if dotenvy::from_filename(&env_file).is_ok() {
            tracing::debug!(file = %env_file, "Loaded environment file");
        }
        dotenvy::dotenv().ok();

        Ok(Self {
            environment: environment.to_string(),
            database: DatabaseConfig::from_env()?,
            destination: DestinationConfig::from_env()?,
            migration: MigrationSettings::from_env(),
            backup_dir: PathBuf::from(
                env::var("BACKUP_DIR").unwrap_or_else(|_| DEFAULT_BACKUP_DIR.to_string()),
            ),
        })
    }

    pub fn is_production(&self) -> bool {
        matches!(
            self.environment.to_lowercase().as_str(),
            "production" | "prod"
        )
    }

    /// Destination settings, required by the migrate command.
    pub fn require_destination(&self) -> Result<&DestinationConfig, anyhow::Error> {
        self.destination.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "Destination not configured: set R2_ENDPOINT, R2_ACCESS_KEY_ID, R2_SECRET_ACCESS_KEY and R2_BUCKET"
            )
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.migration.validate()?;
        if self.database.client == DatabaseClient::Postgres && self.database.url.is_none() {
            anyhow::bail!("DATABASE_URL must be set for postgres");
        }
        Ok(())
    }
}

/// Byte count of `mb` mebibytes, clamped at `u64::MAX`.
fn megabytes(mb: u64) -> u64 {
    mb.saturating_mul(MIB)
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
