//! Log entry representation consumed by the hook.
//!
//! `LogEntry` is the value handed from the host logging pipeline to
//! [`Hook::fire`](crate::Hook::fire). The hook never mutates an entry; it
//! only formats it and hands the bytes to a sink.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use crate::level::Level;

/// One structured log record.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    /// The log message content.
    pub message: String,
    /// Severity of the entry.
    pub level: Level,
    /// Structured key-value pairs attached to the entry.
    pub fields: BTreeMap<String, String>,
    /// Time the entry was created.
    pub timestamp: SystemTime,
    /// Name of the logger or target that produced the entry, if known.
    pub logger: Option<String>,
}

impl LogEntry {
    /// Construct an entry stamped with the current time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            fields: BTreeMap::new(),
            timestamp: SystemTime::now(),
            logger: None,
        }
    }

    /// Attach a key-value pair, replacing any previous value for `key`.
    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl Default for LogEntry {
    fn default() -> Self {
        Self::new(Level::Info, String::new())
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.level, self.message)
    }
}
