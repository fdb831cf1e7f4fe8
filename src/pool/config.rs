//! Configuration consumed by [`ConnectionPool`](super::ConnectionPool).

use std::time::Duration;

use crate::transport::TlsOptions;

use super::backoff::RetryPolicy;

/// Number of write attempts made before a pool write reports failure.
pub const DEFAULT_WRITE_ATTEMPTS: usize = 3;
/// Timeout applied when dialling a collector.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Settings for a multi-host connection pool.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Collector addresses as `host:port`, tried in order when dialling.
    pub hosts: Vec<String>,
    /// Connections opened eagerly at construction.
    pub min_idle: usize,
    /// Upper bound on live (idle or leased) connections.
    pub max_cap: usize,
    pub connect_timeout: Duration,
    pub write_attempts: usize,
    pub tls: Option<TlsOptions>,
    pub retry: RetryPolicy,
}

impl PoolConfig {
    /// Settings for `hosts` with the given bounds and default timeouts.
    pub fn new<I, S>(hosts: I, min_idle: usize, max_cap: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            min_idle,
            max_cap,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_attempts: DEFAULT_WRITE_ATTEMPTS,
            tls: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the dial timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the number of attempts per write. Zero is treated as one.
    pub fn with_write_attempts(mut self, attempts: usize) -> Self {
        self.write_attempts = attempts;
        self
    }

    /// Wrap every connection in TLS.
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
