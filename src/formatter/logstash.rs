//! Logstash JSON event formatter.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::{FormatError, Formatter};
use crate::entry::LogEntry;

const RESERVED_KEYS: [&str; 6] = ["@timestamp", "@version", "message", "level", "type", "logger"];

/// Formats entries as newline-terminated Logstash JSON events.
///
/// Each event carries `@timestamp` (RFC 3339, millisecond precision),
/// `@version`, `message`, a lower-case `level`, the optional event `type`
/// and logger name, and every entry field. Fields whose key clashes with one
/// of those names are emitted under `fields.<key>`.
#[derive(Clone, Debug, Default)]
pub struct LogstashFormatter {
    event_type: Option<String>,
}

impl LogstashFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every event with `type: <event_type>`.
    pub fn with_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    fn event(&self, entry: &LogEntry) -> Map<String, Value> {
        let mut event = Map::new();
        for (key, value) in &entry.fields {
            let key = if RESERVED_KEYS.contains(&key.as_str()) {
                format!("fields.{key}")
            } else {
                key.clone()
            };
            event.insert(key, Value::String(value.clone()));
        }
        let timestamp: DateTime<Utc> = entry.timestamp.into();
        event.insert(
            "@timestamp".into(),
            timestamp.to_rfc3339_opts(SecondsFormat::Millis, true).into(),
        );
        event.insert("@version".into(), "1".into());
        event.insert("message".into(), entry.message.clone().into());
        event.insert(
            "level".into(),
            entry.level.as_str().to_ascii_lowercase().into(),
        );
        if let Some(event_type) = &self.event_type {
            event.insert("type".into(), event_type.clone().into());
        }
        if let Some(logger) = &entry.logger {
            event.insert("logger".into(), logger.clone().into());
        }
        event
    }
}

impl Formatter for LogstashFormatter {
    fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        let mut bytes = serde_json::to_vec(&self.event(entry))?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
