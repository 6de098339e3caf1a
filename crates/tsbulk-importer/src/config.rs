//! Import configuration - can be loaded from YAML and overridden from the command line

use crate::error::{ImportError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tsbulk_core::Precision;

/// Batch size used when none (or zero) is configured
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Retention policy applied when a data phase starts without one
pub const DEFAULT_RETENTION_POLICY: &str = "autogen";

/// Default name of the time column in structured formats
pub const DEFAULT_TIME_FIELD: &str = "time";

/// Input file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Format {
    /// Line protocol text with `#` directives
    #[default]
    #[serde(rename = "line_protocol")]
    LineProtocol,
    #[serde(rename = "csv")]
    Csv,
    /// InfluxDB query-result JSON
    #[serde(rename = "jsoni")]
    JsonInflux,
    /// Prometheus query-result JSON
    #[serde(rename = "jsonp")]
    JsonProm,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::LineProtocol => "line_protocol",
            Format::Csv => "csv",
            Format::JsonInflux => "jsoni",
            Format::JsonProm => "jsonp",
        }
    }
}

impl FromStr for Format {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "line_protocol" | "lp" => Ok(Format::LineProtocol),
            "csv" => Ok(Format::Csv),
            "jsoni" => Ok(Format::JsonInflux),
            "jsonp" => Ok(Format::JsonProm),
            other => Err(ImportError::Config(format!(
                "unknown format {}, only support line_protocol, csv, jsoni, jsonp",
                other
            ))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write path used to deliver batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Newline-joined line protocol through the textual write endpoint
    RowWrite,
    /// Typed records grouped by measurement through a request builder
    ColumnWrite,
}

/// Connection settings for the remote store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Base URL (e.g., "http://127.0.0.1:8086")
    pub url: String,
    /// Basic auth user name, empty to disable authentication
    pub username: String,
    /// Basic auth password
    pub password: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8086".to_string(),
            username: String::new(),
            password: String::new(),
            timeout_ms: 30_000,
        }
    }
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Complete import configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// File to import
    pub path: PathBuf,
    /// Input format
    pub format: Format,
    /// Remote store connection
    pub connection: ConnectionConfig,
    /// Target database for structured formats
    pub database: String,
    /// Target retention policy for structured formats
    pub retention_policy: String,
    /// Measurement for CSV and Prometheus JSON
    pub measurement: String,
    /// Column names imported as tags
    pub tags: Vec<String>,
    /// Column names imported as fields; empty means every remaining column
    pub fields: Vec<String>,
    /// Name of the time column
    pub time_field: String,
    /// Unit of timestamps in the input
    pub precision: Precision,
    /// Units per write request
    pub batch_size: usize,
    /// Use column-write for line protocol input
    pub column_write: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            format: Format::default(),
            connection: ConnectionConfig::default(),
            database: String::new(),
            retention_policy: String::new(),
            measurement: String::new(),
            tags: Vec::new(),
            fields: Vec::new(),
            time_field: DEFAULT_TIME_FIELD.to_string(),
            precision: Precision::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            column_write: false,
        }
    }
}

impl ImportConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ImportConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn batch_size(&self) -> usize {
        if self.batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            self.batch_size
        }
    }

    /// CSV is only imported through column-write and JSON only through
    /// row-write; line protocol follows `column_write`.
    pub fn transport(&self) -> Transport {
        match self.format {
            Format::Csv => Transport::ColumnWrite,
            Format::JsonInflux | Format::JsonProm => Transport::RowWrite,
            Format::LineProtocol if self.column_write => Transport::ColumnWrite,
            Format::LineProtocol => Transport::RowWrite,
        }
    }
}
