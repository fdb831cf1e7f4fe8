//! MessagePack formatter with big-endian length framing.

use std::collections::BTreeMap;

use rmp_serde::Serializer;
use serde::Serialize;

use super::{FormatError, Formatter};
use crate::entry::LogEntry;

/// Default maximum payload size (in bytes) accepted by the formatter.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 20; // 1 MiB

#[derive(Serialize)]
struct SerializableEntry<'a> {
    logger: Option<&'a str>,
    level: &'a str,
    message: &'a str,
    timestamp_ns: u128,
    fields: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a LogEntry> for SerializableEntry<'a> {
    fn from(entry: &'a LogEntry) -> Self {
        let timestamp_ns = entry
            .timestamp
            .duration_since(std::time::UNIX_EPOCH)
            .map(|dur| dur.as_nanos())
            .unwrap_or_default();

        Self {
            logger: entry.logger.as_deref(),
            level: entry.level.as_str(),
            message: &entry.message,
            timestamp_ns,
            fields: &entry.fields,
        }
    }
}

/// Formats entries as MessagePack maps prefixed with a 4-byte length.
#[derive(Clone, Debug)]
pub struct MessagePackFormatter {
    max_frame_size: usize,
}

impl Default for MessagePackFormatter {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl MessagePackFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

impl Formatter for MessagePackFormatter {
    fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        let mut payload = Vec::with_capacity(128);
        SerializableEntry::from(entry)
            .serialize(&mut Serializer::new(&mut payload).with_struct_map())?;
        frame_payload(&payload, self.max_frame_size).ok_or(FormatError::FrameTooLarge {
            size: payload.len(),
            max: self.max_frame_size,
        })
    }
}

/// Frame the payload with a big-endian length prefix.
fn frame_payload(payload: &[u8], max_size: usize) -> Option<Vec<u8>> {
    if payload.len() > max_size {
        return None;
    }
    let len = u32::try_from(payload.len()).ok()?;
    let capacity = payload.len().checked_add(4)?;
    let mut framed = Vec::with_capacity(capacity);
    framed.extend(len.to_be_bytes());
    framed.extend_from_slice(payload);
    Some(framed)
}
