//! Builder for [`Hook`] instances.
//!
//! Collects sink or pool settings, formatter, levels and delivery mode, then
//! validates them in [`HookBuilder::build`]. Defaults live here as
//! constants so callers can inspect them.

use std::{io, sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    formatter::{Formatter, SharedFormatter},
    hook::{DeliveryError, DeliveryMode, Hook},
    level::Level,
    pool::{ConnectionPool, PoolConfig, PoolError, RetryPolicy},
    rate_limited_warner::RateLimitedWarner,
    sink::{SharedSink, Sink},
    transport::TlsOptions,
};

pub use crate::pool::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_ATTEMPTS};
pub use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

/// Queue capacity used when zero is requested.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8192;
/// Connections opened eagerly when a pool is configured.
pub const DEFAULT_MIN_IDLE: usize = 1;
/// Upper bound on pooled connections when none is configured.
pub const DEFAULT_MAX_CAP: usize = 8;

/// Errors produced while building a [`Hook`].
#[derive(Debug, Error)]
pub enum HookBuildError {
    #[error("invalid hook configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("failed to apply write timeout: {0}")]
    Io(#[from] io::Error),
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == Some(Default::default()) {
            Err(HookBuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok(())
        }
    }};
}

/// Builder for constructing [`Hook`] instances.
#[derive(Clone, Default)]
pub struct HookBuilder {
    sink: Option<SharedSink>,
    hosts: Vec<String>,
    formatter: Option<SharedFormatter>,
    levels: Option<Vec<Level>>,
    mode: DeliveryMode,
    capacity: Option<usize>,
    min_idle: Option<usize>,
    max_cap: Option<usize>,
    connect_timeout: Option<Duration>,
    write_attempts: Option<usize>,
    write_timeout: Option<Duration>,
    warn_interval: Option<Duration>,
    tls: Option<TlsOptions>,
    retry: Option<RetryPolicy>,
}

impl HookBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver to `sink`. Mutually exclusive with [`with_hosts`](Self::with_hosts).
    pub fn with_sink<S: Sink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Deliver through a connection pool over `hosts`.
    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Set the formatter. Defaults to [`LogstashFormatter`](crate::LogstashFormatter).
    pub fn with_formatter<F: Formatter + 'static>(mut self, formatter: F) -> Self {
        self.formatter = Some(SharedFormatter::new(formatter));
        self
    }

    /// Restrict the accepted levels. Defaults to every level.
    pub fn with_levels(mut self, levels: impl IntoIterator<Item = Level>) -> Self {
        self.levels = Some(levels.into_iter().collect());
        self
    }

    /// Select the delivery mode. Buffered mode uses
    /// [`with_capacity`](Self::with_capacity), defaulting to
    /// [`DEFAULT_BUFFER_CAPACITY`].
    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the pool bounds. Only meaningful together with hosts.
    pub fn with_pool_bounds(mut self, min_idle: usize, max_cap: usize) -> Self {
        self.min_idle = Some(min_idle);
        self.max_cap = Some(max_cap);
        self
    }

    option_setter!(
        #[doc = "Set the queue capacity used in buffered mode."]
        with_capacity,
        capacity,
        usize
    );
    option_setter!(with_connect_timeout, connect_timeout, Duration);
    option_setter!(with_write_attempts, write_attempts, usize);
    option_setter!(
        #[doc = "Set a write deadline this far from build time."]
        with_write_timeout,
        write_timeout,
        Duration
    );
    option_setter!(with_warn_interval, warn_interval, Duration);
    option_setter!(with_tls, tls, TlsOptions);
    option_setter!(with_retry_policy, retry, RetryPolicy);

    fn validate(&self) -> Result<(), HookBuildError> {
        match (&self.sink, self.hosts.is_empty()) {
            (None, true) => {
                return Err(HookBuildError::InvalidConfig(
                    "a sink or at least one host is required".into(),
                ));
            }
            (Some(_), false) => {
                return Err(HookBuildError::InvalidConfig(
                    "a sink and pool hosts are mutually exclusive".into(),
                ));
            }
            _ => {}
        }
        if self.tls.is_some() && self.hosts.is_empty() {
            return Err(HookBuildError::InvalidConfig(
                "TLS options require pool hosts".into(),
            ));
        }
        ensure_positive!(self.write_attempts, "write_attempts")?;
        ensure_positive!(self.connect_timeout, "connect_timeout")?;
        Ok(())
    }

    fn pool_config(&self) -> PoolConfig {
        let min_idle = self.min_idle.unwrap_or(DEFAULT_MIN_IDLE);
        let max_cap = self.max_cap.unwrap_or(DEFAULT_MAX_CAP.max(min_idle));
        let mut config = PoolConfig::new(self.hosts.iter().cloned(), min_idle, max_cap)
            .with_connect_timeout(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
            .with_write_attempts(self.write_attempts.unwrap_or(DEFAULT_WRITE_ATTEMPTS));
        if let Some(tls) = &self.tls {
            config = config.with_tls(tls.clone());
        }
        if let Some(retry) = &self.retry {
            config = config.with_retry_policy(retry.clone());
        }
        config
    }

    /// Validate the settings and build the hook.
    ///
    /// With hosts configured the pool is built here, so an unreachable host
    /// list fails the build.
    pub fn build(&self) -> Result<Hook, HookBuildError> {
        self.validate()?;
        let sink: SharedSink = match &self.sink {
            Some(sink) => Arc::clone(sink),
            None => Arc::new(ConnectionPool::with_config(self.pool_config())?),
        };
        let warner = RateLimitedWarner::new(self.warn_interval.unwrap_or(DEFAULT_WARN_INTERVAL));
        let hook = Hook::from_parts(sink, self.formatter.clone().unwrap_or_default(), warner);
        if let Some(levels) = &self.levels {
            hook.set_levels(levels.iter().copied());
        }
        if let Some(timeout) = self.write_timeout {
            hook.set_timeout(timeout)?;
        }
        match self.mode {
            DeliveryMode::Sync => {}
            DeliveryMode::AsyncUnbuffered => hook.async_mode(),
            DeliveryMode::AsyncBuffered => hook.async_buffer(self.capacity.unwrap_or(0))?,
        }
        Ok(hook)
    }
}

impl std::fmt::Debug for HookBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookBuilder")
            .field("has_sink", &self.sink.is_some())
            .field("hosts", &self.hosts)
            .field("mode", &self.mode)
            .field("capacity", &self.capacity)
            .field("pool_bounds", &(self.min_idle, self.max_cap))
            .field("connect_timeout", &self.connect_timeout)
            .field("write_attempts", &self.write_attempts)
            .field("write_timeout", &self.write_timeout)
            .field("tls", &self.tls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rstest::rstest;

    use super::*;
    use crate::{entry::LogEntry, formatter::FormatError, sink::WriterSink};

    fn message_only(entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        Ok(entry.message.clone().into_bytes())
    }

    fn invalid(builder: HookBuilder) -> String {
        match builder.build() {
            Err(HookBuildError::InvalidConfig(msg)) => msg,
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("builder should reject the configuration"),
        }
    }

    #[rstest]
    fn requires_a_destination() {
        assert_eq!(
            invalid(HookBuilder::new()),
            "a sink or at least one host is required"
        );
    }

    #[rstest]
    fn rejects_sink_and_hosts_together() {
        let builder = HookBuilder::new()
            .with_sink(WriterSink::new(Vec::new()))
            .with_hosts(["127.0.0.1:5000"]);
        assert_eq!(invalid(builder), "a sink and pool hosts are mutually exclusive");
    }

    #[rstest]
    fn rejects_tls_without_hosts() {
        let builder = HookBuilder::new()
            .with_sink(WriterSink::new(Vec::new()))
            .with_tls(TlsOptions::default());
        assert_eq!(invalid(builder), "TLS options require pool hosts");
    }

    #[rstest]
    #[case::write_attempts(HookBuilder::new().with_write_attempts(0), "write_attempts")]
    #[case::connect_timeout(HookBuilder::new().with_connect_timeout(Duration::ZERO), "connect_timeout")]
    fn rejects_zero_values(#[case] builder: HookBuilder, #[case] field: &str) {
        let builder = builder.with_hosts(["127.0.0.1:5000"]);
        assert_eq!(invalid(builder), format!("{field} must be greater than zero"));
    }

    #[rstest]
    fn accepts_positive_limits() {
        let builder = HookBuilder::new()
            .with_hosts(["127.0.0.1:5000"])
            .with_write_attempts(2)
            .with_connect_timeout(Duration::from_millis(250));
        assert!(builder.validate().is_ok());
    }

    #[rstest]
    fn builds_sync_hook_with_defaults() {
        let hook = HookBuilder::new()
            .with_sink(WriterSink::new(Vec::new()))
            .build()
            .expect("valid configuration");
        assert_eq!(hook.mode(), DeliveryMode::Sync);
        assert_eq!(hook.levels().len(), 6);
    }

    #[rstest]
    fn builds_buffered_hook_with_default_capacity() {
        let hook = HookBuilder::new()
            .with_sink(WriterSink::new(Vec::new()))
            .with_formatter(message_only)
            .with_mode(DeliveryMode::AsyncBuffered)
            .with_levels([Level::Error])
            .build()
            .expect("valid configuration");
        assert_eq!(hook.buffer_capacity(), Some(DEFAULT_BUFFER_CAPACITY));
        assert_eq!(hook.levels(), vec![Level::Error]);
    }

    #[rstest]
    fn unreachable_hosts_fail_the_build() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let err = HookBuilder::new()
            .with_hosts([addr.to_string()])
            .with_connect_timeout(Duration::from_millis(200))
            .build()
            .expect_err("nothing listens");
        assert!(matches!(err, HookBuildError::Pool(PoolError::FillFailed(_))));
    }

    #[rstest]
    fn pool_bounds_are_validated_by_the_pool() {
        let err = HookBuilder::new()
            .with_hosts(["127.0.0.1:5000"])
            .with_pool_bounds(3, 2)
            .build()
            .expect_err("min above max");
        assert_eq!(err.to_string(), "invalid capacity settings");
    }

    #[rstest]
    fn built_hook_writes_through_sink() {
        #[derive(Clone, Default)]
        struct Shared(Arc<parking_lot::Mutex<Vec<u8>>>);

        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let buffer = Shared::default();
        let hook = HookBuilder::new()
            .with_sink(WriterSink::new(buffer.clone()))
            .with_formatter(message_only)
            .build()
            .expect("valid configuration");
        hook.fire(LogEntry::new(Level::Info, "built"))
            .expect("sync delivery");
        assert_eq!(buffer.0.lock().as_slice(), b"built");
    }
}
