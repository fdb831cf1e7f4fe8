//! Resilient multi-host connection pool.
//!
//! [`ConnectionPool`] keeps a bounded set of reusable connections spread over
//! a static list of collector hosts. New connections are dialled through a
//! health-aware [`HostSelector`]: a host that refuses a dial is marked
//! unhealthy and the next candidate is tried, up to one attempt per host.
//! Writes lease a connection, apply the configured deadline, and either
//! return the connection or evict it on failure, retrying on a fresh
//! connection within a fixed attempt budget.
//!
//! The pool implements [`Sink`](crate::Sink) so it can replace a plain
//! connection behind the hook.

mod backoff;
mod channel;
mod config;
mod health;


use std::{
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    sink::{Sink, is_transient, remaining},
    transport::{NetConnection, TlsOptions, connect},
};

use channel::{ChannelPool, Factory};

pub use backoff::{DEFAULT_RETRY_BASE, DEFAULT_RETRY_CAP, RetryPolicy};
pub use config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_ATTEMPTS, PoolConfig};
pub use health::{HostHealth, HostSelector};

/// Errors produced while building or using a [`ConnectionPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// `min_idle` exceeds `max_cap`, or `max_cap` is zero.
    #[error("invalid capacity settings")]
    InvalidCapacity,
    #[error("no collector hosts configured")]
    NoHosts,
    /// No host could be dialled while filling the pool to `min_idle`.
    #[error("factory is not able to fill the pool: {0}")]
    FillFailed(#[source] io::Error),
    #[error(transparent)]
    Dial(io::Error),
    #[error(transparent)]
    Write(io::Error),
    #[error("pool is closed")]
    Closed,
}

impl From<PoolError> for io::Error {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Dial(err) | PoolError::Write(err) => err,
            other => io::Error::other(other),
        }
    }
}

/// A writable connection managed by the pool.
pub trait Connection: Send + 'static {
    /// Bound the duration of subsequent writes; `None` removes the bound.
    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

impl Connection for NetConnection {
    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        NetConnection::set_write_timeout(self, timeout)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        NetConnection::write_all(self, data)
    }
}

/// Opens connections to a named host.
pub trait Dialer: Send + Sync + 'static {
    type Conn: Connection;

    fn dial(&self, host: &str) -> io::Result<Self::Conn>;
}

/// Dials plain TCP, or TLS when options are supplied.
#[derive(Clone, Debug)]
pub struct TcpDialer {
    connect_timeout: Duration,
    tls: Option<TlsOptions>,
}

impl TcpDialer {
    /// Create a dialer bounding each connect (and TLS handshake) by
    /// `connect_timeout`.
    pub fn new(connect_timeout: Duration, tls: Option<TlsOptions>) -> Self {
        Self {
            connect_timeout,
            tls,
        }
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, None)
    }
}

impl Dialer for TcpDialer {
    type Conn = NetConnection;

    fn dial(&self, host: &str) -> io::Result<NetConnection> {
        connect(host, self.connect_timeout, self.tls.as_ref())
    }
}

/// A pooled connection remembers the host it was dialled to so failures can
/// be attributed.
struct Tracked<C> {
    conn: C,
    host: Arc<str>,
}

/// Point-in-time view of pool occupancy and host health.
#[derive(Clone, Debug)]
pub struct PoolStats {
    pub idle: usize,
    pub live: usize,
    pub hosts: Vec<(String, HostHealth)>,
}

/// Bounded, self-healing pool of collector connections.
pub struct ConnectionPool<D: Dialer = TcpDialer> {
    selector: Arc<HostSelector>,
    conns: ChannelPool<Tracked<D::Conn>>,
    deadline: Mutex<Option<Instant>>,
    write_attempts: usize,
}

impl ConnectionPool<TcpDialer> {
    /// Build a TCP pool over `hosts`, opening `min_idle` connections now.
    pub fn new<I, S>(hosts: I, min_idle: usize, max_cap: usize) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(PoolConfig::new(hosts, min_idle, max_cap))
    }

    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        let dialer = TcpDialer::new(config.connect_timeout, config.tls.clone());
        Self::with_dialer(config, dialer)
    }
}

impl<D: Dialer> ConnectionPool<D> {
    /// Build a pool whose connections are opened by `dialer`.
    pub fn with_dialer(config: PoolConfig, dialer: D) -> Result<Self, PoolError> {
        if config.max_cap == 0 || config.min_idle > config.max_cap {
            return Err(PoolError::InvalidCapacity);
        }
        if config.hosts.is_empty() {
            return Err(PoolError::NoHosts);
        }
        let selector = Arc::new(HostSelector::new(&config.hosts, config.retry.clone()));
        let factory = make_factory(Arc::clone(&selector), dialer);
        let conns = ChannelPool::new(config.min_idle, config.max_cap, factory)?;
        debug!(
            "stashhook: pool ready with {} connection(s) across {} host(s)",
            config.min_idle,
            config.hosts.len()
        );
        Ok(Self {
            selector,
            conns,
            deadline: Mutex::new(None),
            write_attempts: config.write_attempts.max(1),
        })
    }

    /// Write `data` on a pooled connection, retrying on fresh connections.
    ///
    /// A closed pool fails at once with [`PoolError::Closed`]; every other
    /// failure consumes one attempt and the last one is returned.
    ///
    /// `io::Result` carries no byte count on error, so a failed write reports
    /// none. Bytes that reached a connection before it failed are discarded
    /// along with that connection, and the next attempt resends the whole
    /// payload.
    pub fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut attempt = 1;
        loop {
            match self.write_once(data) {
                Ok(written) => return Ok(written),
                Err(PoolError::Closed) => return Err(PoolError::Closed.into()),
                Err(err) if attempt >= self.write_attempts => return Err(err.into()),
                Err(err) => {
                    debug!(
                        "stashhook: pool write attempt {attempt}/{} failed: {err}",
                        self.write_attempts
                    );
                    attempt += 1;
                }
            }
        }
    }

    fn write_once(&self, data: &[u8]) -> Result<usize, PoolError> {
        let mut lease = self.conns.get()?;
        let timeout = remaining(*self.deadline.lock(), Instant::now());
        if let Err(err) = lease.conn.set_write_timeout(timeout) {
            debug!("stashhook: failed to apply write deadline: {err}");
        }
        match lease.conn.write_all(data) {
            Ok(()) => Ok(data.len()),
            Err(err) => {
                let host = Arc::clone(&lease.host);
                lease.mark_unusable();
                drop(lease);
                self.selector.mark_failed(&host);
                if is_transient(&err) {
                    debug!("stashhook: evicted connection to {host} after transient failure: {err}");
                } else {
                    debug!("stashhook: evicted connection to {host}: {err}");
                }
                Err(PoolError::Write(err))
            }
        }
    }

    /// Record an absolute deadline for subsequent writes.
    ///
    /// A deadline that has passed by the time a write starts is not applied.
    pub fn set_write_deadline(&self, deadline: Option<Instant>) {
        *self.deadline.lock() = deadline;
    }

    /// Close idle connections and stop dialling. Idempotent.
    pub fn close(&self) {
        if self.conns.is_closed() {
            return;
        }
        self.conns.close();
        self.selector.close();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.conns.is_closed()
    }

    /// Snapshot of connection counts and per-host health.
    pub fn stats(&self) -> PoolStats {
        let (idle, live) = self.conns.counts();
        PoolStats {
            idle,
            live,
            hosts: self.selector.snapshot(),
        }
    }
}

fn make_factory<D: Dialer>(selector: Arc<HostSelector>, dialer: D) -> Factory<Tracked<D::Conn>> {
    Box::new(move || {
        let mut last_err = None;
        for _ in 0..selector.len() {
            let Some(host) = selector.select() else {
                break;
            };
            match dialer.dial(&host) {
                Ok(conn) => {
                    selector.mark_success(&host);
                    return Ok(Tracked { conn, host });
                }
                Err(err) => {
                    warn!("stashhook: failed to dial {host}: {err}");
                    selector.mark_failed(&host);
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "no collector host available")
        }))
    })
}

impl<D: Dialer> Sink for ConnectionPool<D> {
    fn write(&self, data: &[u8]) -> io::Result<usize> {
        ConnectionPool::write(self, data)
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        ConnectionPool::set_write_deadline(self, deadline);
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        ConnectionPool::close(self);
        Ok(())
    }
}

impl<D: Dialer> Drop for ConnectionPool<D> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<D: Dialer> std::fmt::Debug for ConnectionPool<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("stats", &self.stats())
            .field("write_attempts", &self.write_attempts)
            .finish()
    }
}
