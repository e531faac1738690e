// Copyright (c) 2026 gasview contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/gasview/gasview-rs

//! Configuration module: application settings plus the per-query record

use anyhow::Result;
use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// The two supported instrument families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// CRDS-style analyzer; whitespace `.dat` logs in a year/month/day tree
    Picarro,
    /// Secondary laser analyzer; comma-delimited `.txt` logs in a flat directory
    Pico,
}

impl DataSource {
    /// Canonical channel set for this source, in column order
    pub fn channels(&self) -> &'static [&'static str] {
        match self {
            DataSource::Picarro => &["CO2_dry", "CH4_dry", "H2O", "CO2", "CH4"],
            DataSource::Pico => &["CH4", "C2H6", "H2O", "Tgas"],
        }
    }

    /// Channels checked by zero/threshold filtering
    pub fn filter_channels(&self) -> &'static [&'static str] {
        match self {
            DataSource::Picarro => &["CO2_dry", "CH4_dry", "H2O"],
            DataSource::Pico => &["CH4", "C2H6", "H2O"],
        }
    }

    /// Short lowercase label used in table names and logs
    pub fn label(&self) -> &'static str {
        match self {
            DataSource::Picarro => "picarro",
            DataSource::Pico => "pico",
        }
    }

    /// Name of this source's aggregate table in the cache store
    pub fn table_name(&self) -> String {
        format!("{}_aggregates", self.label())
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DataSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "picarro" => Ok(DataSource::Picarro),
            "pico" => Ok(DataSource::Pico),
            other => Err(ConfigError::UnknownDataSource(other.to_string())),
        }
    }
}

/// A fixed-width aggregation window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    secs: u32,
}

impl TimeWindow {
    /// The single resolution the cache stores; coarser views derive from it
    pub const CANONICAL: TimeWindow = TimeWindow { secs: 60 };

    /// Window of `n` seconds. Zero is not a valid window.
    pub fn seconds(n: u32) -> Option<Self> {
        (n > 0).then_some(Self { secs: n })
    }

    /// Window of `n` minutes
    pub fn minutes(n: u32) -> Option<Self> {
        n.checked_mul(60).and_then(Self::seconds)
    }

    /// Window width in seconds
    pub fn as_secs(&self) -> i64 {
        self.secs as i64
    }

    /// Compact label stored alongside aggregate rows, e.g. `30s`, `5min`, `1h`
    pub fn label(&self) -> String {
        if self.secs % 3600 == 0 {
            format!("{}h", self.secs / 3600)
        } else if self.secs % 60 == 0 {
            format!("{}min", self.secs / 60)
        } else {
            format!("{}s", self.secs)
        }
    }

    /// Parse a window code. `raw`, `none` and the empty string mean
    /// "no aggregation" and yield `None`.
    pub fn parse(code: &str) -> Result<Option<Self>, ConfigError> {
        let code = code.trim().to_ascii_lowercase();
        if code.is_empty() || code == "raw" || code == "none" {
            return Ok(None);
        }

        let split = code.find(|c: char| !c.is_ascii_digit()).unwrap_or(code.len());
        let (num, unit) = code.split_at(split);
        let n: u32 = num
            .parse()
            .map_err(|_| ConfigError::BadWindow(code.clone()))?;

        let secs = match unit {
            "s" | "sec" => Some(n),
            "min" | "m" | "t" => n.checked_mul(60),
            "h" | "hr" => n.checked_mul(3600),
            _ => return Err(ConfigError::BadWindow(code)),
        };

        secs.and_then(TimeWindow::seconds)
            .map(Some)
            .ok_or(ConfigError::BadWindow(code))
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Central-tendency statistic used per bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggMethod {
    Mean,
    Median,
}

impl AggMethod {
    /// Label stored alongside aggregate rows
    pub fn label(&self) -> &'static str {
        match self {
            AggMethod::Mean => "mean",
            AggMethod::Median => "median",
        }
    }
}

impl FromStr for AggMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(AggMethod::Mean),
            "median" => Ok(AggMethod::Median),
            other => Err(ConfigError::UnknownAggMethod(other.to_string())),
        }
    }
}

/// Row filtering applied to raw samples before aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ZeroFilter {
    /// Keep every row
    Off,
    /// Keep rows where all checked channels are non-zero
    NonZero,
    /// Keep rows where each listed channel is strictly above its minimum
    Threshold(HashMap<String, f64>),
}

/// One query against the core, supplied by the dashboard collaborator.
/// Transient; never persisted.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Which instrument family to read
    pub source: DataSource,

    /// Local wall-clock range start (no embedded zone)
    pub start: NaiveDateTime,

    /// Local wall-clock range end
    pub end: NaiveDateTime,

    /// IANA zone used to localize `start`/`end` and to render output timestamps
    pub timezone: Tz,

    /// Aggregation window; `None` requests raw passthrough
    pub window: Option<TimeWindow>,

    /// Central-tendency statistic
    pub method: AggMethod,

    /// Raw-row filtering policy
    pub zero_filter: ZeroFilter,

    /// Optional per-channel (low, high) display ranges, passed through to
    /// the plotting collaborator untouched
    pub display_ranges: HashMap<String, (f64, f64)>,

    /// Read from the durable cache when possible
    pub use_cache: bool,
}

impl QueryConfig {
    /// Reject invalid queries before any I/O happens
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start >= self.end {
            return Err(ConfigError::StartAfterEnd {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Localize the naive range to the query timezone and convert to UTC
    pub fn utc_range(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), ConfigError> {
        Ok((
            localize(self.timezone, self.start)?.with_timezone(&Utc),
            localize(self.timezone, self.end)?.with_timezone(&Utc),
        ))
    }

    /// Composed key for the in-process result memo
    pub fn memo_key(&self) -> String {
        let window = self
            .window
            .map(|w| w.label())
            .unwrap_or_else(|| "raw".to_string());
        let filter = match &self.zero_filter {
            ZeroFilter::Off => "off".to_string(),
            ZeroFilter::NonZero => "nonzero".to_string(),
            ZeroFilter::Threshold(t) => {
                let mut parts: Vec<String> =
                    t.iter().map(|(k, v)| format!("{k}>{v}")).collect();
                parts.sort();
                parts.join(",")
            }
        };
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.source,
            self.start,
            self.end,
            self.timezone,
            window,
            self.method.label(),
            filter,
            self.use_cache,
        )
    }
}

/// Localize a naive wall-clock instant to a zone. Ambiguous instants (DST
/// fold) resolve to the earlier offset; nonexistent instants are an error.
pub fn localize(tz: Tz, naive: NaiveDateTime) -> Result<DateTime<Tz>, ConfigError> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earlier, _) => Ok(earlier),
        LocalResult::None => Err(ConfigError::NonexistentLocalTime { naive, tz }),
    }
}

/// Configuration and query-validation failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("start {start} is not before end {end}")]
    StartAfterEnd {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("local time {naive} does not exist in zone {tz}")]
    NonexistentLocalTime { naive: NaiveDateTime, tz: Tz },

    #[error("unknown data source '{0}' (expected 'picarro' or 'pico')")]
    UnknownDataSource(String),

    #[error("unknown aggregation method '{0}' (expected 'mean' or 'median')")]
    UnknownAggMethod(String),

    #[error("unrecognized time window '{0}'")]
    BadWindow(String),
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root of the Picarro year/month/day data tree
    pub picarro_root: PathBuf,

    /// Flat directory holding Pico `.txt` logs
    pub pico_root: PathBuf,

    /// SQLite cache database path
    pub cache_path: PathBuf,

    /// Prefer cached 1-minute aggregates over re-parsing raw files
    pub use_cache: bool,

    /// Expiry of the in-process result memo, in seconds
    pub result_ttl_secs: u64,

    /// Log level
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            picarro_root: PathBuf::from("./data/picarro"),
            pico_root: PathBuf::from("./data/pico"),
            cache_path: PathBuf::from("./data/gasview.db"),
            use_cache: true,
            result_ttl_secs: 60,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Data root for a source
    pub fn root_for(&self, source: DataSource) -> &Path {
        match source {
            DataSource::Picarro => &self.picarro_root,
            DataSource::Pico => &self.pico_root,
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("gasview"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
