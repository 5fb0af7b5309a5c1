#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Append-only JSON-lines logging shared by the pipeline telemetry and the audit trail.
//!
//! A logger owns a primary location and, optionally, a fallback location. Each line is
//! written to the primary file first; if that write fails the same line goes to the
//! fallback. Reads prefer the primary file and fall back when it does not exist.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Log severity level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
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

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Module emitting the log.
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
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

    /// Adds a metadata field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Thread-safe JSON-lines logger with append-only semantics.
#[derive(Debug)]
pub struct JsonLogger {
    primary: PathBuf,
    fallback: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path, failing if it cannot be written.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        open_append(&path)?;
        Ok(Self {
            primary: path,
            fallback: None,
            write_lock: Mutex::new(()),
        })
    }

    /// Creates a logger that tries `primary` first and `fallback` second.
    ///
    /// Neither location is touched until the first write, so an unwritable primary
    /// is not an error here.
    #[must_use]
    pub fn with_fallback(primary: impl Into<PathBuf>, fallback: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            fallback: Some(fallback.into()),
            write_lock: Mutex::new(()),
        }
    }

    /// Writes a log record as JSON line.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        self.append(record).map(|_| ())
    }

    /// Appends any serializable value as a single JSON line.
    ///
    /// Returns the location that accepted the line.
    pub fn append<T: Serialize>(&self, value: &T) -> Result<&Path> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        let _guard = self.write_lock.lock();
        let primary_err = match write_line(&self.primary, &line) {
            Ok(()) => return Ok(self.primary.as_path()),
            Err(err) => err,
        };
        let Some(fallback) = &self.fallback else {
            return Err(primary_err);
        };
        write_line(fallback, &line).map_err(|fallback_err| {
            anyhow!(
                "primary {} failed ({primary_err:#}); fallback {} failed ({fallback_err:#})",
                self.primary.display(),
                fallback.display()
            )
        })?;
        Ok(fallback.as_path())
    }

    /// Reads every well-formed line back, skipping lines that do not decode as `T`.
    ///
    /// The primary location is read when it exists, otherwise the fallback. A logger
    /// that has never been written to yields an empty list.
    pub fn read_records<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let source = if self.primary.exists() {
            &self.primary
        } else if let Some(fallback) = self.fallback.as_ref().filter(|p| p.exists()) {
            fallback
        } else {
            return Ok(Vec::new());
        };
        let content = fs::read_to_string(source)
            .with_context(|| format!("reading {}", source.display()))?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// Returns the primary file path (useful for tests).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.primary
    }

    /// Returns the fallback file path, if any.
    #[must_use]
    pub fn fallback_path(&self) -> Option<&Path> {
        self.fallback.as_deref()
    }
}

fn open_append(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))
}

fn write_line(path: &Path, line: &[u8]) -> Result<()> {
    let mut file = open_append(path)?;
    file.write_all(line)?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("test.log")).unwrap();
        logger
            .log(&LogRecord::new("module", LogLevel::Info, "hello").with_field("count", 2))
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(content.contains("\"message\":\"hello\""));
        assert!(content.contains("\"count\":2"));
    }

    #[test]
    fn falls_back_when_primary_unwritable() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "file in the way").unwrap();
        let fallback = dir.path().join("fallback.log");
        let logger = JsonLogger::with_fallback(blocker.join("audit.log"), &fallback);

        let written = logger.append(&json!({ "type": "simplify" })).unwrap();
        assert_eq!(written, fallback.as_path());

        let records: Vec<Value> = logger.read_records().unwrap();
        assert_eq!(records, vec![json!({ "type": "simplify" })]);
    }

    #[test]
    fn errors_when_both_locations_fail() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let logger = JsonLogger::with_fallback(blocker.join("a.log"), blocker.join("b.log"));
        assert!(logger.append(&json!({})).is_err());
    }

    #[test]
    fn read_skips_malformed_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        fs::write(&path, "{\"a\":1}\nnot json\n\n{\"a\":2}\n").unwrap();
        let logger = JsonLogger::with_fallback(&path, dir.path().join("unused.log"));
        let records: Vec<Value> = logger.read_records().unwrap();
        assert_eq!(records, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[test]
    fn read_of_untouched_logger_is_empty() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::with_fallback(dir.path().join("a.log"), dir.path().join("b.log"));
        let records: Vec<Value> = logger.read_records().unwrap();
        assert!(records.is_empty());
    }
}
