//! Formatters turning [`LogEntry`] values into wire payloads.
//!
//! Provides the [`Formatter`] trait consumed by the hook alongside a
//! shareable trait-object wrapper. Two concrete formatters ship with the
//! crate: [`LogstashFormatter`] emits newline-delimited JSON events and
//! [`MessagePackFormatter`] emits length-prefixed MessagePack frames.

use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::entry::LogEntry;

mod logstash;
mod msgpack;

pub use logstash::LogstashFormatter;
pub use msgpack::{DEFAULT_MAX_FRAME_SIZE, MessagePackFormatter};

/// Failure to serialise an entry.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to encode entry as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to encode entry as MessagePack: {0}")]
    MessagePack(#[from] rmp_serde::encode::Error),
    #[error("encoded entry of {size} bytes exceeds frame limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },
    /// Failure reported by a caller-supplied formatter.
    #[error("{0}")]
    Custom(String),
}

impl FormatError {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// Trait for formatting log entries into bytes.
///
/// Implementors must be thread-safe (`Send + Sync`) because the hook formats
/// on caller threads as well as on its background worker.
pub trait Formatter: Send + Sync {
    /// Serialise one entry. The returned bytes are written verbatim.
    fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError>;
}

impl<F> Formatter for F
where
    F: Fn(&LogEntry) -> Result<Vec<u8>, FormatError> + Send + Sync,
{
    fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        self(entry)
    }
}

/// Shared formatter trait object used by the hook and its worker.
#[derive(Clone)]
pub struct SharedFormatter {
    inner: Arc<dyn Formatter>,
}

impl SharedFormatter {
    pub fn new<F>(formatter: F) -> Self
    where
        F: Formatter + 'static,
    {
        let inner: Arc<dyn Formatter> = Arc::new(formatter);
        Self { inner }
    }

    pub fn from_arc(inner: Arc<dyn Formatter>) -> Self {
        Self { inner }
    }

    pub fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        self.inner.format(entry)
    }
}

impl fmt::Debug for SharedFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedFormatter(<dyn Formatter>)")
    }
}

impl Default for SharedFormatter {
    fn default() -> Self {
        Self::new(LogstashFormatter::default())
    }
}
