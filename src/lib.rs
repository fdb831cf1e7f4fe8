//! Ship structured log entries to remote collectors.
//!
//! A [`Hook`] formats each [`LogEntry`] with a [`Formatter`] and writes the
//! bytes to a [`Sink`], either on the caller's thread or in the background.
//! The [`ConnectionPool`] sink spreads writes over several collector hosts,
//! evicting broken connections and failing over between hosts.
//!
//! ```no_run
//! use stashhook::{Hook, Level, LogEntry, LogstashFormatter, TcpSink};
//! use std::time::Duration;
//!
//! let sink = TcpSink::connect("127.0.0.1:5000", Duration::from_secs(3), None)?;
//! let hook = Hook::new(sink, LogstashFormatter::new());
//! hook.use_pool(["10.0.0.1:5000", "10.0.0.2:5000"], 1, 4)?;
//! hook.async_buffer(0)?;
//! hook.fire(LogEntry::new(Level::Info, "started").with_field("app", "demo"))?;
//! hook.flush();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
mod entry;
pub mod formatter;
mod hook;
mod level;
#[cfg(feature = "log-compat")]
pub mod log_compat;
pub mod pool;
pub mod rate_limited_warner;
mod sink;
#[cfg(feature = "tracing-compat")]
pub mod tracing_compat;
mod transport;

pub use config::{DEFAULT_BUFFER_CAPACITY, HookBuildError, HookBuilder};
pub use entry::LogEntry;
pub use formatter::{
    FormatError, Formatter, LogstashFormatter, MessagePackFormatter, SharedFormatter,
};
pub use hook::{DeliveryError, DeliveryMode, Hook};
pub use level::{ALL_LEVELS, Level, ParseLevelError};
#[cfg(feature = "log-compat")]
pub use log_compat::HookLogger;
pub use pool::{Connection, ConnectionPool, Dialer, PoolConfig, PoolError, PoolStats, TcpDialer};
pub use sink::{SharedSink, Sink, TcpSink, WriterSink, is_transient};
#[cfg(feature = "tracing-compat")]
pub use tracing_compat::HookLayer;
pub use transport::{NetConnection, TlsOptions};

/// Whether `target` names this crate or one of its modules.
///
/// The `log` and `tracing` bridges skip these targets so the hook's own
/// diagnostics never feed back into it.
#[cfg(any(feature = "log-compat", feature = "tracing-compat"))]
pub(crate) fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix("stashhook")
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}
