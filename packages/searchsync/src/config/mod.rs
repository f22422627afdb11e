//! Sync engine configuration
//!
//! Defaults match what the engine needs out of the box (batches of 1000,
//! one-minute scroll keep-alive). Deployments override them through a
//! versioned YAML document or `SEARCHSYNC_*` environment variables.
//!
//! ```yaml
//! version: 1
//! batch_size: 500
//! scroll:
//!   page_size: 250
//!   keep_alive_secs: 30
//! index:
//!   number_of_shards: 1
//!   number_of_replicas: 0
//!   refresh_interval: "1s"
//! ```

pub mod error;

pub use error::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Batch size shared by rebuild streaming, bulk writes and bulk deletes
pub const DEFAULT_BATCH_SIZE: usize = 1000;

const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Operations per bulk request and records per rebuild batch (1..=10000)
    pub batch_size: usize,

    /// Scroll cursor settings
    pub scroll: ScrollConfig,

    /// Settings applied to every created index
    pub index: IndexSettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            scroll: ScrollConfig::default(),
            index: IndexSettings::default(),
        }
    }
}

/// Scroll cursor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScrollConfig {
    /// Hits per scroll page (1..=10000)
    pub page_size: usize,

    /// Server-side cursor lifetime between continuation requests (1..=3600)
    pub keep_alive_secs: u64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_BATCH_SIZE,
            keep_alive_secs: 60,
        }
    }
}

impl ScrollConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.page_size < 1 || self.page_size > 10_000 {
            return Err(ConfigError::range_with_hint(
                "scroll.page_size",
                self.page_size,
                1,
                10_000,
                "Backends cap a single page at 10000 hits",
            ));
        }

        if self.keep_alive_secs < 1 || self.keep_alive_secs > 3600 {
            return Err(ConfigError::range_with_hint(
                "scroll.keep_alive_secs",
                self.keep_alive_secs,
                1,
                3600,
                "Long keep-alives pin backend resources",
            ));
        }

        Ok(())
    }
}

/// Index settings sent along with every index creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexSettings {
    /// Primary shards (1..=64)
    pub number_of_shards: u32,

    /// Replica shards (0..=8)
    pub number_of_replicas: u32,

    /// Backend refresh interval: `-1` (manual) or a number with `ms`, `s` or `m`
    pub refresh_interval: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            number_of_shards: 1,
            number_of_replicas: 0,
            refresh_interval: "1s".to_string(),
        }
    }
}

impl IndexSettings {
    /// Parsed refresh interval, `None` when refresh is manual (`-1`)
    pub fn refresh_interval(&self) -> ConfigResult<Option<Duration>> {
        parse_interval(&self.refresh_interval)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.number_of_shards < 1 || self.number_of_shards > 64 {
            return Err(ConfigError::range_with_hint(
                "index.number_of_shards",
                self.number_of_shards,
                1,
                64,
                "An index needs at least one primary shard",
            ));
        }

        if self.number_of_replicas > 8 {
            return Err(ConfigError::range_with_hint(
                "index.number_of_replicas",
                self.number_of_replicas,
                0,
                8,
                "Replica count must be reasonable",
            ));
        }

        self.refresh_interval()?;
        Ok(())
    }
}

fn parse_interval(raw: &str) -> ConfigResult<Option<Duration>> {
    let raw = raw.trim();
    if raw == "-1" {
        return Ok(None);
    }

    let invalid = || ConfigError::InvalidValue {
        field: "index.refresh_interval".to_string(),
        value: raw.to_string(),
        hint: "Use -1 or a number followed by ms, s or m (e.g. \"1s\")".to_string(),
    };

    let (digits, unit) = raw
        .find(|c: char| !c.is_ascii_digit())
        .map(|at| raw.split_at(at))
        .ok_or_else(invalid)?;
    let amount: u64 = digits.parse().map_err(|_| invalid())?;

    match unit {
        "ms" => Ok(Some(Duration::from_millis(amount))),
        "s" => Ok(Some(Duration::from_secs(amount))),
        "m" => Ok(Some(Duration::from_secs(
            amount.checked_mul(60).ok_or_else(invalid)?,
        ))),
        _ => Err(invalid()),
    }
}

/// YAML schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFileV1 {
    #[serde(default)]
    version: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    batch_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    scroll: Option<ScrollConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<IndexSettings>,
}

impl SyncConfig {
    /// Load and validate a YAML configuration file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate a YAML configuration document
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;

        let version = file.version.ok_or(ConfigError::MissingVersion)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConfigError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let mut config = Self::default();
        if let Some(batch_size) = file.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(scroll) = file.scroll {
            config.scroll = scroll;
        }
        if let Some(index) = file.index {
            config.index = index;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: Some(1),
            batch_size: Some(self.batch_size),
            scroll: Some(self.scroll.clone()),
            index: Some(self.index.clone()),
        };
        Ok(serde_yaml::to_string(&file)?)
    }

    /// Apply `SEARCHSYNC_*` environment overrides on top of `self`
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (environment in production)
    pub fn with_overrides_from<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: String) -> ConfigResult<T> {
            raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw.clone(),
                hint: "Expected a non-negative integer".to_string(),
            })
        }

        if let Some(raw) = lookup("SEARCHSYNC_BATCH_SIZE") {
            self.batch_size = parse("SEARCHSYNC_BATCH_SIZE", raw)?;
        }
        if let Some(raw) = lookup("SEARCHSYNC_SCROLL_PAGE_SIZE") {
            self.scroll.page_size = parse("SEARCHSYNC_SCROLL_PAGE_SIZE", raw)?;
        }
        if let Some(raw) = lookup("SEARCHSYNC_SCROLL_KEEP_ALIVE_SECS") {
            self.scroll.keep_alive_secs = parse("SEARCHSYNC_SCROLL_KEEP_ALIVE_SECS", raw)?;
        }
        if let Some(raw) = lookup("SEARCHSYNC_REFRESH_INTERVAL") {
            self.index.refresh_interval = raw;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.batch_size < 1 || self.batch_size > 10_000 {
            return Err(ConfigError::range_with_hint(
                "batch_size",
                self.batch_size,
                1,
                10_000,
                "Batches bound request size and peak memory",
            ));
        }

        self.scroll.validate()?;
        self.index.validate()
    }
}
