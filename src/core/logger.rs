//! Session logging functionality
//!
//! Core components never open files or write to stdout. They log through a
//! [`Logger`] handle wrapping an injected [`LogSink`]. The standard sink is
//! [`SessionLogger`], which forwards to `tracing` and keeps a bounded history
//! of recent lines for operator display.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Default number of lines kept in the history ring
pub const DEFAULT_HISTORY_LINES: usize = 200;

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose diagnostics (hex dumps, skipped bytes)
    Debug,
    /// Normal progress
    Info,
    /// Recovered anomaly
    Warn,
    /// Failure the operator should look at
    Error,
}

impl LogLevel {
    /// Get name
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// History export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// `HH:MM:SS.fff > message`
    #[default]
    Text,
    /// One JSON object per line
    JsonLines,
}

impl LogFormat {
    /// Get file extension for format
    pub fn extension(&self) -> &'static str {
        match self {
            LogFormat::Text => "txt",
            LogFormat::JsonLines => "jsonl",
        }
    }
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the line was emitted
    pub timestamp: DateTime<Local>,
    /// Severity
    pub level: LogLevel,
    /// Message text
    pub message: String,
}

impl LogEntry {
    /// Create new entry stamped now
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    /// Format as text
    pub fn to_text(&self) -> String {
        format!("{} > {}", self.timestamp.format("%H:%M:%S%.3f"), self.message)
    }

    /// Format as JSON line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Destination for log lines
pub trait LogSink: Send + Sync {
    /// Emit one line. Must not fail or block for long.
    fn emit(&self, level: LogLevel, message: &str);
}

/// Sink that drops everything
#[derive(Debug, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn emit(&self, _level: LogLevel, _message: &str) {}
}

/// Cloneable logging handle passed to core components
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Logger {
    /// Wrap a sink
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Logger that discards everything
    pub fn discard() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Emit at an explicit level
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        self.sink.emit(level, message.as_ref());
    }

    /// Emit debug line
    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    /// Emit info line
    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    /// Emit warning line
    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message);
    }

    /// Emit error line
    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::discard()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

/// Session logger: `tracing` output plus a bounded in-memory history
pub struct SessionLogger {
    /// Recent lines, oldest first
    history: Mutex<VecDeque<LogEntry>>,
    /// Max history size
    max_history: usize,
    /// Debug lines are forwarded to tracing but kept out of the history
    keep_debug: bool,
}

impl Default for SessionLogger {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LINES)
    }
}

impl SessionLogger {
    /// Create logger keeping at most `max_history` lines
    pub fn new(max_history: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(max_history.min(4096))),
            max_history,
            keep_debug: false,
        }
    }

    /// Also keep debug lines in the history
    #[must_use]
    pub fn with_debug_history(mut self, keep: bool) -> Self {
        self.keep_debug = keep;
        self
    }

    /// Wrap into a shareable [`Logger`] handle, keeping access to the history
    pub fn into_handle(self) -> (Arc<SessionLogger>, Logger) {
        let shared = Arc::new(self);
        let logger = Logger::new(shared.clone());
        (shared, logger)
    }

    /// Copy of the current history
    pub fn history(&self) -> Vec<LogEntry> {
        self.history.lock().iter().cloned().collect()
    }

    /// Last `count` lines, oldest first
    pub fn recent(&self, count: usize) -> Vec<LogEntry> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(count);
        history.iter().skip(skip).cloned().collect()
    }

    /// Number of lines currently held
    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    /// True when no lines are held
    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }

    /// Clear history
    pub fn clear(&self) {
        self.history.lock().clear();
    }

    /// Export history to string
    pub fn export(&self, format: LogFormat) -> String {
        let mut result = String::new();
        for entry in self.history.lock().iter() {
            let line = match format {
                LogFormat::Text => entry.to_text(),
                LogFormat::JsonLines => entry.to_json(),
            };
            result.push_str(&line);
            result.push('\n');
        }
        result
    }

    fn record(&self, entry: LogEntry) {
        if self.max_history == 0 {
            return;
        }
        let mut history = self.history.lock();
        if history.len() >= self.max_history {
            history.pop_front();
        }
        history.push_back(entry);
    }
}

impl LogSink for SessionLogger {
    fn emit(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "rtkrelay", "{message}"),
            LogLevel::Info => tracing::info!(target: "rtkrelay", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "rtkrelay", "{message}"),
            LogLevel::Error => tracing::error!(target: "rtkrelay", "{message}"),
        }

        if level == LogLevel::Debug && !self.keep_debug {
            return;
        }
        self.record(LogEntry::new(level, message));
    }
}
