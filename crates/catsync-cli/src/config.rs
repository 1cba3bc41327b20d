//! Configuration management for catsync
//!
//! Layering, lowest to highest precedence: built-in defaults, the TOML file
//! (`catsync.toml` or `--config`), `.env` and `CATSYNC_*` environment
//! variables, then command-line flags applied by the caller.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "catsync.toml";

/// Enrichment API base URL; the product endpoint is appended to it.
pub const DEFAULT_API_BASE_URL: &str = "https://api.keepa.com";

/// Prefix joined with the record key to build the product page URL.
pub const DEFAULT_PRODUCT_URL_BASE: &str = "https://www.amazon.co.jp/dp/";

/// Catalog domain id sent with every request (5 = amazon.co.jp).
pub const DEFAULT_DOMAIN: u32 = 5;

/// Statistics window in days sent with every request.
pub const DEFAULT_STATS_DAYS: u32 = 90;

/// Keys per enrichment request.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Timeout for a single enrichment request in seconds.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 60;

/// Sheet holding the catalog table.
pub const DEFAULT_SHEET: &str = "リサーチ";

/// Row number of the header row.
pub const DEFAULT_HEAD_ROW: u32 = 1;

/// Header of the identifier column.
pub const DEFAULT_KEY_COLUMN: &str = "ASIN";

/// A lease older than this is considered abandoned and may be taken over.
pub const DEFAULT_LEASE_TTL_SECS: u64 = 3600;

/// Complete catsync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub api: ApiConfig,
    pub table: TableConfig,
    pub run: RunConfig,
    pub checkpoint: CheckpointConfig,
}

/// Enrichment API settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,

    /// API credential; never written back out by `config show`
    pub api_key: Option<String>,

    pub domain: u32,
    pub stats_days: u32,
    pub rating: bool,
    pub buybox: bool,
    pub timeout_secs: u64,
    pub product_url_base: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            domain: DEFAULT_DOMAIN,
            stats_days: DEFAULT_STATS_DAYS,
            rating: false,
            buybox: true,
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            product_url_base: DEFAULT_PRODUCT_URL_BASE.to_string(),
        }
    }
}

/// Table store settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TableConfig {
    /// Directory holding one `<sheet>.csv` per sheet
    pub dir: PathBuf,
    pub sheet: String,
    pub head_row: u32,
    pub key_column: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
            sheet: DEFAULT_SHEET.to_string(),
            head_row: DEFAULT_HEAD_ROW,
            key_column: DEFAULT_KEY_COLUMN.to_string(),
        }
    }
}

/// Per-run limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum keys processed per run; 0 makes every run a no-op
    pub max_records: usize,
    pub batch_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_records: 0,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Checkpoint slot and lease settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckpointConfig {
    pub path: PathBuf,
    pub lease_ttl_secs: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./catsync-checkpoint.json"),
            lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
        }
    }
}

impl SyncConfig {
    /// Load defaults, the config file, and environment overrides, then validate
    ///
    /// An explicit `path` must exist; the default `catsync.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            },
            None => Self::default(),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| SyncError::config(format!("{}: {}", path.display(), e)))
    }

    /// Parse TOML text; missing sections and keys fall back to defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SyncError::config(e.message().to_string()))
    }

    /// Apply `CATSYNC_*` environment overrides
    ///
    /// Environment variables:
    /// - `CATSYNC_API_KEY`, `CATSYNC_API_URL`, `CATSYNC_API_TIMEOUT_SECS`
    /// - `CATSYNC_MAX_RECORDS`, `CATSYNC_BATCH_SIZE`
    /// - `CATSYNC_TABLE_DIR`, `CATSYNC_SHEET`, `CATSYNC_HEAD_ROW`, `CATSYNC_KEY_COLUMN`
    /// - `CATSYNC_CHECKPOINT_PATH`, `CATSYNC_LEASE_TTL_SECS`
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(key) = std::env::var("CATSYNC_API_KEY") {
            self.api.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("CATSYNC_API_URL") {
            self.api.base_url = url;
        }
        if let Some(secs) = env_parse("CATSYNC_API_TIMEOUT_SECS")? {
            self.api.timeout_secs = secs;
        }
        if let Some(max) = env_parse("CATSYNC_MAX_RECORDS")? {
            self.run.max_records = max;
        }
        if let Some(size) = env_parse("CATSYNC_BATCH_SIZE")? {
            self.run.batch_size = size;
        }
        if let Ok(dir) = std::env::var("CATSYNC_TABLE_DIR") {
            self.table.dir = PathBuf::from(dir);
        }
        if let Ok(sheet) = std::env::var("CATSYNC_SHEET") {
            self.table.sheet = sheet;
        }
        if let Some(row) = env_parse("CATSYNC_HEAD_ROW")? {
            self.table.head_row = row;
        }
        if let Ok(column) = std::env::var("CATSYNC_KEY_COLUMN") {
            self.table.key_column = column;
        }
        if let Ok(path) = std::env::var("CATSYNC_CHECKPOINT_PATH") {
            self.checkpoint.path = PathBuf::from(path);
        }
        if let Some(ttl) = env_parse("CATSYNC_LEASE_TTL_SECS")? {
            self.checkpoint.lease_ttl_secs = ttl;
        }
        Ok(())
    }

    /// Reject settings no run could work with
    pub fn validate(&self) -> Result<()> {
        if self.run.batch_size == 0 {
            return Err(SyncError::config("run.batch_size must be at least 1"));
        }
        if self.table.head_row == 0 {
            return Err(SyncError::config("table.head_row starts at 1"));
        }
        if self.table.sheet.trim().is_empty() {
            return Err(SyncError::config("table.sheet must not be empty"));
        }
        if self.table.key_column.trim().is_empty() {
            return Err(SyncError::config("table.key_column must not be empty"));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(SyncError::config("api.base_url must not be empty"));
        }
        Ok(())
    }

    /// The API key, required before any request is made
    pub fn require_api_key(&self) -> Result<&str> {
        self.api
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| SyncError::config("api.api_key is not set (use CATSYNC_API_KEY)"))
    }

    /// Copy safe to print
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.api.api_key.is_some() {
            copy.api.api_key = Some("********".to_string());
        }
        copy
    }

    /// Serialize back to TOML (used by `config show`)
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SyncError::config(e.to_string()))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SyncError::config(format!("{} has an invalid value '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}
