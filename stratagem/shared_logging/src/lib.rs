#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON logging sinks used by the planning core and its runtime.

use std::{
    fmt,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational events.
    Info,
    /// Warning indicator.
    Warn,
    /// Error indicator.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => bail!("unknown log level: {other}"),
        }
    }
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Component emitting the log.
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Dotted event-style message (e.g. `planning.schedule.ready`).
    pub message: String,
    /// Arbitrary JSON payload for metrics/fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record with the provided info.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attaches a metadata field.
    #[must_use]
    pub fn with_field(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replaces metadata with the fields of a JSON object; other values are ignored.
    #[must_use]
    pub fn with_metadata(mut self, metadata: &serde_json::Value) -> Self {
        if let Some(obj) = metadata.as_object() {
            self.metadata = obj.clone();
        }
        self
    }
}

/// Destination for structured log records.
pub trait LogSink: Send + Sync {
    /// Persists one record. Records below the sink threshold are dropped silently.
    fn write(&self, record: &LogRecord) -> Result<()>;

    /// Minimum level accepted by the sink.
    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }

    /// Whether a record at `level` would be kept.
    fn accepts(&self, level: LogLevel) -> bool {
        level >= self.min_level()
    }
}

/// Thread-safe JSON-lines logger with append-only semantics.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    min_level: LogLevel,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path accepting every level.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_level(path, LogLevel::Debug)
    }

    /// Creates or opens a logger that drops records below `min_level`.
    pub fn with_level(path: impl AsRef<Path>, min_level: LogLevel) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            min_level,
            writer: Mutex::new(file),
        })
    }

    /// Returns the underlying file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for JsonLogger {
    fn write(&self, record: &LogRecord) -> Result<()> {
        if !self.accepts(record.level) {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

/// In-memory sink that keeps every accepted record.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    min_level: Option<LogLevel>,
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    /// Creates a sink accepting every level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that drops records below `min_level`.
    #[must_use]
    pub fn with_level(min_level: LogLevel) -> Self {
        Self {
            min_level: Some(min_level),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Copies out the retained records.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Retained records whose message equals `message`.
    #[must_use]
    pub fn find(&self, message: &str) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.message == message)
            .cloned()
            .collect()
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing has been retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl LogSink for MemoryLogger {
    fn write(&self, record: &LogRecord) -> Result<()> {
        if self.accepts(record.level) {
            self.records.lock().push(record.clone());
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level.unwrap_or(LogLevel::Debug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("nested/plan.log")).unwrap();
        logger
            .write(
                &LogRecord::new("planning", LogLevel::Info, "planning.ready")
                    .with_field("tasks", 3),
            )
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(content.contains("\"message\":\"planning.ready\""));
        assert!(content.contains("\"tasks\":3"));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn json_logger_filters_below_threshold() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::with_level(dir.path().join("plan.log"), LogLevel::Warn).unwrap();
        logger
            .write(&LogRecord::new("planning", LogLevel::Debug, "noise"))
            .unwrap();
        logger
            .write(&LogRecord::new("planning", LogLevel::Error, "cycle"))
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(!content.contains("noise"));
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn memory_logger_retains_records() {
        let sink = MemoryLogger::with_level(LogLevel::Info);
        sink.write(&LogRecord::new("m", LogLevel::Debug, "skip")).unwrap();
        sink.write(&LogRecord::new("m", LogLevel::Info, "keep")).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.find("keep").len(), 1);
        assert!(sink.find("skip").is_empty());
    }

    #[test]
    fn levels_parse_and_order() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert!(LogLevel::Error > LogLevel::Info);
        assert_eq!(LogLevel::Info.to_string(), "INFO");
    }

    #[test]
    fn metadata_only_accepts_objects() {
        let record = LogRecord::new("m", LogLevel::Info, "x")
            .with_metadata(&serde_json::json!({ "a": 1 }))
            .with_metadata(&serde_json::json!([1, 2]));
        assert_eq!(record.metadata.len(), 1);
    }
}
