//! Application-wide constants.

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Payloads at or below this size are uploaded in a single request.
pub const MULTIPART_THRESHOLD_BYTES: u64 = 5 * MIB;

/// Fixed part size for multipart uploads.
pub const MULTIPART_PART_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Maximum number of multipart parts in flight for one object.
pub const MULTIPART_MAX_PARALLEL_PARTS: usize = 4;

/// Hard cap on a single asset payload.
pub const DEFAULT_MAX_ASSET_SIZE_MB: u64 = 100;

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_SOURCE_PROBE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_DOWNLOAD_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

pub const DEFAULT_STATE_FILE: &str = "migration-state.json";
pub const DEFAULT_BACKUP_DIR: &str = "backups";
pub const DEFAULT_ASSET_TABLE: &str = "files";
pub const DEFAULT_SQLITE_FILENAME: &str = ".tmp/data.db";

pub const DEFAULT_SOURCE_PROVIDER: &str = "cloudinary";
pub const DEFAULT_DESTINATION_PROVIDER: &str = "aws-s3";

/// Prefix of the placeholder url reported for records in a dry run.
pub const DRY_RUN_URL_PREFIX: &str = "[DRY RUN] ";

/// Timestamp format shared by every artifact of one backup invocation.
/// Lexicographic order of the rendered token equals chronological order.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";
