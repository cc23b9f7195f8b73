//! Event log
//!
//! The orchestrator reports every user-facing event to an [`EventLog`] sink
//! and never reads it back. [`SessionLogger`] is the stock sink: a bounded
//! in-memory history that can also mirror entries to a file.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared handle on a [`SessionLogger`]
pub type Logger = Arc<Mutex<SessionLogger>>;

/// Category of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    /// Neutral information
    Info,
    /// Something worked (connect, register hit)
    Success,
    /// Something failed
    Error,
    /// Bytes sent
    Tx,
    /// Bytes received
    Rx,
}

impl LogCategory {
    /// Short tag used in text output
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Success => "OK",
            Self::Error => "ERR",
            Self::Tx => "TX",
            Self::Rx => "RX",
        }
    }
}

/// A single log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Time the event was recorded
    pub timestamp: DateTime<Local>,
    /// Category
    pub category: LogCategory,
    /// Human-readable text
    pub text: String,
}

impl LogEntry {
    /// Create an entry stamped now
    pub fn new(category: LogCategory, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            category,
            text: text.into(),
        }
    }

    /// Format as text
    pub fn to_text(&self) -> String {
        format!(
            "[{}] {:<4} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.category.tag(),
            self.text
        )
    }

    /// Format as CSV
    pub fn to_csv(&self) -> String {
        format!(
            "\"{}\",\"{}\",\"{}\"",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.category.tag(),
            self.text.replace('"', "\"\"")
        )
    }

    /// Format as JSON line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

/// Append-only sink for user-facing events
pub trait EventLog: Send + Sync {
    /// Record an entry; order of calls is the order of the log
    fn append(&self, entry: LogEntry);
}

impl EventLog for Mutex<SessionLogger> {
    fn append(&self, entry: LogEntry) {
        self.lock().append(entry);
    }
}

/// File format for mirrored entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text
    #[default]
    Text,
    /// CSV with timestamp
    Csv,
    /// JSON lines
    JsonLines,
}

impl LogFormat {
    /// Get file extension for format
    pub fn extension(&self) -> &'static str {
        match self {
            LogFormat::Text => "txt",
            LogFormat::Csv => "csv",
            LogFormat::JsonLines => "jsonl",
        }
    }

    fn line(&self, entry: &LogEntry) -> String {
        match self {
            LogFormat::Text => entry.to_text(),
            LogFormat::Csv => entry.to_csv(),
            LogFormat::JsonLines => entry.to_json(),
        }
    }
}

/// In-memory event history with optional file mirror
pub struct SessionLogger {
    file: Option<BufWriter<File>>,
    format: LogFormat,
    path: Option<PathBuf>,
    buffer: VecDeque<LogEntry>,
    max_buffer: usize,
    lines_logged: usize,
}

impl Default for SessionLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLogger {
    /// Create a logger keeping the last 10 000 entries in memory
    pub fn new() -> Self {
        Self {
            file: None,
            format: LogFormat::Text,
            path: None,
            buffer: VecDeque::new(),
            max_buffer: 10_000,
            lines_logged: 0,
        }
    }

    /// Wrap into a shared handle usable as an [`EventLog`]
    pub fn shared(self) -> Logger {
        Arc::new(Mutex::new(self))
    }

    /// Start mirroring entries to a file (appending)
    pub fn start(&mut self, path: &Path, format: LogFormat) -> io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);

        if format == LogFormat::Csv && writer.get_ref().metadata()?.len() == 0 {
            writeln!(writer, "Timestamp,Category,Text")?;
        }

        self.file = Some(writer);
        self.format = format;
        self.path = Some(path.to_path_buf());
        self.lines_logged = 0;
        tracing::debug!("Mirroring event log to {}", path.display());
        Ok(())
    }

    /// Stop mirroring
    pub fn stop(&mut self) {
        if let Some(ref mut file) = self.file {
            let _ = file.flush();
        }
        self.file = None;
    }

    /// Is a file mirror active
    pub fn is_logging(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the file mirror
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// Append an entry
    pub fn append(&mut self, entry: LogEntry) {
        if let Some(ref mut file) = self.file {
            if let Err(e) = writeln!(file, "{}", self.format.line(&entry)) {
                tracing::warn!("Failed to write event log: {}", e);
            }
            self.lines_logged += 1;

            if self.lines_logged % 100 == 0 {
                let _ = file.flush();
            }
        }

        self.buffer.push_back(entry);
        while self.buffer.len() > self.max_buffer {
            self.buffer.pop_front();
        }
    }

    /// Entries currently held in memory, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.buffer.iter().cloned().collect()
    }

    /// Number of entries held in memory
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the in-memory history is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Set max buffer size
    pub fn set_max_buffer(&mut self, size: usize) {
        self.max_buffer = size;
        while self.buffer.len() > self.max_buffer {
            self.buffer.pop_front();
        }
    }

    /// Flush to disk
    pub fn flush(&mut self) {
        if let Some(ref mut file) = self.file {
            let _ = file.flush();
        }
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Generate log filename with timestamp
pub fn generate_log_filename(prefix: &str, format: LogFormat) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{}.{}", prefix, timestamp, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_text() {
        let entry = LogEntry::new(LogCategory::Tx, "TX: 01 03");
        let text = entry.to_text();
        assert!(text.contains("TX"));
        assert!(text.ends_with("TX: 01 03"));
    }

    #[test]
    fn test_entry_csv_escapes_quotes() {
        let entry = LogEntry::new(LogCategory::Error, "Error: \"bad\"");
        assert!(entry.to_csv().ends_with("\"ERR\",\"Error: \"\"bad\"\"\""));
    }

    #[test]
    fn test_entry_json() {
        let entry = LogEntry::new(LogCategory::Rx, "RX: 01");
        let value: serde_json::Value = serde_json::from_str(&entry.to_json()).unwrap();
        assert_eq!(value["category"], "rx");
        assert_eq!(value["text"], "RX: 01");
    }

    #[test]
    fn test_insertion_order() {
        let logger = SessionLogger::new().shared();
        let sink: &dyn EventLog = &*logger;
        sink.append(LogEntry::new(LogCategory::Info, "first"));
        sink.append(LogEntry::new(LogCategory::Success, "second"));

        let texts: Vec<_> = logger.lock().entries().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_buffer_limit() {
        let mut logger = SessionLogger::new();
        logger.set_max_buffer(5);

        for i in 0..10 {
            logger.append(LogEntry::new(LogCategory::Info, i.to_string()));
        }

        assert_eq!(logger.len(), 5);
        assert_eq!(logger.entries()[0].text, "5");
    }

    #[test]
    fn test_file_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(generate_log_filename("events", LogFormat::Csv));

        let mut logger = SessionLogger::new();
        logger.start(&path, LogFormat::Csv).unwrap();
        logger.append(LogEntry::new(LogCategory::Success, "Connected to SIM0"));
        logger.stop();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "Timestamp,Category,Text");
        assert!(lines[1].ends_with("\"OK\",\"Connected to SIM0\""));
        assert!(!logger.is_logging());
        assert_eq!(logger.path(), Some(&path));
    }
}
