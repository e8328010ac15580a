//! # Logger Service
//!
//! This crate implements structured, bounded event logging for the NvM
//! services.
//!
//! ## Philosophy
//!
//! Logging is explicit and structured, not text-based or printf-style.
//! Every component that needs an observable trail owns an [`EventLog`]: a
//! ring of [`LogEntry`] values stamped with virtual time. Entries are also
//! forwarded to `tracing`, so a host that installs a subscriber sees the same
//! events without the components knowing about it.

use serde::Serialize;
use std::collections::VecDeque;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational messages
    Info,
    /// Warnings
    Warn,
    /// Errors
    Error,
}

/// A structured log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Virtual time the entry was recorded at
    pub timestamp_ms: u64,
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Structured fields
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// Creates a new log entry
    pub fn new(timestamp_ms: u64, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            level,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field to the log entry
    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// Looks up a field value by key
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Bounded, chronologically ordered event log
///
/// Once `capacity` entries are held, recording a new entry evicts the oldest.
#[derive(Debug, Clone)]
pub struct EventLog {
    component: &'static str,
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl EventLog {
    /// Creates an empty log for `component` holding at most `capacity` entries
    pub fn new(component: &'static str, capacity: usize) -> Self {
        Self {
            component,
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Records an entry, evicting the oldest one if the log is full
    pub fn record(&mut self, entry: LogEntry) {
        emit(self.component, &entry);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Returns the newest `n` entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Iterates over all retained entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Returns the most recent entry
    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn emit(component: &'static str, entry: &LogEntry) {
    let fields = entry
        .fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ");
    match entry.level {
        LogLevel::Debug => tracing::debug!(
            component,
            t = entry.timestamp_ms,
            %fields,
            "{}",
            entry.message
        ),
        LogLevel::Info => tracing::info!(
            component,
            t = entry.timestamp_ms,
            %fields,
            "{}",
            entry.message
        ),
        LogLevel::Warn => tracing::warn!(
            component,
            t = entry.timestamp_ms,
            %fields,
            "{}",
            entry.message
        ),
        LogLevel::Error => tracing::error!(
            component,
            t = entry.timestamp_ms,
            %fields,
            "{}",
            entry.message
        ),
    }
}
