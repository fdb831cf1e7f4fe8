//! Dispatch hook routing entries to a sink.
//!
//! A [`Hook`] starts in synchronous mode: [`Hook::fire`] formats and writes
//! the entry before returning and reports any failure. It can be switched,
//! once and only forwards, to one of two asynchronous modes:
//!
//! * **unbuffered**: every call spawns its own delivery thread and returns at
//!   once;
//! * **buffered**: entries go onto a bounded queue drained in FIFO order by a
//!   single worker thread. A full queue blocks the caller.
//!
//! Asynchronous failures never reach the caller. They are counted and
//! reported through rate-limited `log` warnings. [`Hook::flush`] waits until
//! every entry submitted before it was called has been attempted.
//!
//! `fire` holds the shared side of the dispatch lock while it hands the entry
//! off; `flush`, mode changes and `close` take the exclusive side. The
//! delivery threads never touch that lock.

mod pending;


use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::{
    config::DEFAULT_BUFFER_CAPACITY,
    entry::LogEntry,
    formatter::{FormatError, Formatter, SharedFormatter},
    level::{ALL_LEVELS, Level},
    pool::{ConnectionPool, PoolConfig, PoolError},
    rate_limited_warner::RateLimitedWarner,
    sink::{SharedSink, Sink},
};

use pending::PendingCount;

/// How long `Drop` waits for outstanding deliveries before detaching.
const DROP_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors surfaced by [`Hook::fire`].
///
/// Only synchronous delivery reports `Format` and `Write`; asynchronous
/// modes log them instead.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to format entry: {0}")]
    Format(#[from] FormatError),
    #[error("failed to write entry: {0}")]
    Write(#[from] io::Error),
    /// The delivery worker thread could not be started.
    #[error("failed to start delivery worker: {0}")]
    Worker(#[source] io::Error),
    #[error("hook is closed")]
    Closed,
}

/// How [`Hook::fire`] hands entries to the sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    #[default]
    Sync,
    AsyncUnbuffered,
    AsyncBuffered,
}

enum Dispatch {
    Sync,
    AsyncUnbuffered,
    AsyncBuffered(Sender<LogEntry>),
    /// Shut down; remembers the mode it was closed from.
    Closed(DeliveryMode),
}

impl Dispatch {
    fn mode(&self) -> DeliveryMode {
        match self {
            Self::Sync => DeliveryMode::Sync,
            Self::AsyncUnbuffered => DeliveryMode::AsyncUnbuffered,
            Self::AsyncBuffered(_) => DeliveryMode::AsyncBuffered,
            Self::Closed(mode) => *mode,
        }
    }
}

/// State shared with the delivery threads.
struct Delivery {
    formatter: SharedFormatter,
    sink: RwLock<SharedSink>,
    pending: PendingCount,
    warner: RateLimitedWarner,
}

impl Delivery {
    fn sink(&self) -> SharedSink {
        Arc::clone(&self.sink.read())
    }

    fn deliver(&self, entry: &LogEntry) -> Result<(), DeliveryError> {
        let payload = self.formatter.format(entry)?;
        self.sink().write(&payload)?;
        Ok(())
    }

    /// Deliver in the background: failures are counted, never returned.
    fn deliver_or_warn(&self, entry: &LogEntry) {
        if let Err(err) = self.deliver(entry) {
            self.record_drop(&err);
        }
    }

    fn record_drop(&self, err: &DeliveryError) {
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            warn!("stashhook: dropped {count} entries; last error: {err}");
        });
    }

    fn report_drops(&self) {
        self.warner.flush(|count| {
            warn!("stashhook: dropped {count} entries since the last report");
        });
    }
}

struct Worker {
    handle: JoinHandle<()>,
    done_rx: Receiver<()>,
}

/// Routes log entries through a formatter to a sink.
pub struct Hook {
    delivery: Arc<Delivery>,
    levels: RwLock<Vec<Level>>,
    gate: RwLock<Dispatch>,
    timeout: Mutex<Option<Duration>>,
    worker: Mutex<Option<Worker>>,
}

impl Hook {
    /// Create a synchronous hook accepting every level.
    pub fn new<S, F>(sink: S, formatter: F) -> Self
    where
        S: Sink + 'static,
        F: Formatter + 'static,
    {
        Self::from_parts(
            Arc::new(sink),
            SharedFormatter::new(formatter),
            RateLimitedWarner::default(),
        )
    }

    pub(crate) fn from_parts(
        sink: SharedSink,
        formatter: SharedFormatter,
        warner: RateLimitedWarner,
    ) -> Self {
        Self {
            delivery: Arc::new(Delivery {
                formatter,
                sink: RwLock::new(sink),
                pending: PendingCount::default(),
                warner,
            }),
            levels: RwLock::new(ALL_LEVELS.to_vec()),
            gate: RwLock::new(Dispatch::Sync),
            timeout: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Deliver `entry` according to the current mode.
    ///
    /// In synchronous mode the formatter or sink error is returned. The
    /// asynchronous modes return `Ok(())` once the entry is handed off; the
    /// buffered mode blocks while the queue is full.
    pub fn fire(&self, entry: LogEntry) -> Result<(), DeliveryError> {
        let gate = self.gate.read();
        match &*gate {
            Dispatch::Sync => self.delivery.deliver(&entry),
            Dispatch::AsyncUnbuffered => {
                self.spawn_delivery(entry);
                Ok(())
            }
            Dispatch::AsyncBuffered(tx) => {
                self.delivery.pending.add();
                if tx.send(entry).is_err() {
                    self.delivery.pending.done();
                    return Err(DeliveryError::Closed);
                }
                Ok(())
            }
            Dispatch::Closed(_) => Err(DeliveryError::Closed),
        }
    }

    fn spawn_delivery(&self, entry: LogEntry) {
        let delivery = Arc::clone(&self.delivery);
        delivery.pending.add();
        let spawned = thread::Builder::new()
            .name("stashhook-deliver".into())
            .spawn({
                let delivery = Arc::clone(&delivery);
                move || {
                    delivery.deliver_or_warn(&entry);
                    delivery.pending.done();
                }
            });
        if let Err(err) = spawned {
            delivery.pending.done();
            delivery.record_drop(&DeliveryError::Worker(err));
        }
    }

    /// Levels this hook wants to receive.
    pub fn levels(&self) -> Vec<Level> {
        self.levels.read().clone()
    }

    /// Replace the accepted levels. Entries at other levels are still
    /// delivered when fired directly; the bridges consult [`accepts`](Self::accepts).
    pub fn set_levels(&self, levels: impl IntoIterator<Item = Level>) {
        *self.levels.write() = levels.into_iter().collect();
    }

    /// Whether `level` is among the accepted levels.
    pub fn accepts(&self, level: Level) -> bool {
        self.levels.read().contains(&level)
    }

    /// Current delivery mode. A closed hook reports the mode it closed in.
    pub fn mode(&self) -> DeliveryMode {
        self.gate.read().mode()
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        matches!(*self.gate.read(), Dispatch::Closed(_))
    }

    /// Capacity of the delivery queue in buffered mode.
    pub fn buffer_capacity(&self) -> Option<usize> {
        match &*self.gate.read() {
            Dispatch::AsyncBuffered(tx) => tx.capacity(),
            _ => None,
        }
    }

    /// Switch to unbuffered asynchronous delivery.
    ///
    /// Has no effect once the hook is asynchronous or closed.
    pub fn async_mode(&self) {
        let mut gate = self.gate.write();
        if matches!(*gate, Dispatch::Sync) {
            *gate = Dispatch::AsyncUnbuffered;
            debug!("stashhook: switched to unbuffered async delivery");
        }
    }

    /// Switch to buffered asynchronous delivery and start the drain worker.
    ///
    /// A `capacity` of zero selects [`DEFAULT_BUFFER_CAPACITY`]. Calling this
    /// again once buffered leaves the existing queue in place.
    pub fn async_buffer(&self, capacity: usize) -> Result<(), DeliveryError> {
        let mut gate = self.gate.write();
        match &*gate {
            Dispatch::Closed(_) => return Err(DeliveryError::Closed),
            Dispatch::AsyncBuffered(tx) => {
                warn!(
                    "stashhook: delivery is already buffered (capacity {:?}); ignoring request for {capacity}",
                    tx.capacity()
                );
                return Ok(());
            }
            Dispatch::Sync | Dispatch::AsyncUnbuffered => {}
        }
        let capacity = if capacity == 0 {
            DEFAULT_BUFFER_CAPACITY
        } else {
            capacity
        };
        let (tx, rx) = bounded(capacity);
        let worker = spawn_worker(Arc::clone(&self.delivery), rx).map_err(DeliveryError::Worker)?;
        *self.worker.lock() = Some(worker);
        *gate = Dispatch::AsyncBuffered(tx);
        debug!("stashhook: switched to buffered async delivery with capacity {capacity}");
        Ok(())
    }

    /// Wait until every entry fired before this call has been attempted.
    ///
    /// Returns at once in synchronous mode. Concurrent `fire` calls block
    /// until the wait is over. There is no timeout; see
    /// [`flush_timeout`](Self::flush_timeout).
    pub fn flush(&self) {
        if self.mode() == DeliveryMode::Sync {
            return;
        }
        let gate = self.gate.write();
        if matches!(*gate, Dispatch::Closed(_)) {
            return;
        }
        self.delivery.pending.wait();
        drop(gate);
        self.delivery.report_drops();
    }

    /// Like [`flush`](Self::flush) but gives up after `timeout`.
    ///
    /// Returns `false` if entries were still pending when the time ran out.
    pub fn flush_timeout(&self, timeout: Duration) -> bool {
        if self.mode() == DeliveryMode::Sync {
            return true;
        }
        let gate = self.gate.write();
        let drained = self.delivery.pending.wait_for(timeout);
        drop(gate);
        self.delivery.report_drops();
        drained
    }

    /// Replace the sink with a connection pool over `hosts`.
    pub fn use_pool<I, S>(&self, hosts: I, min_idle: usize, max_cap: usize) -> Result<(), PoolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.use_pool_with(PoolConfig::new(hosts, min_idle, max_cap))
    }

    /// Replace the sink with a connection pool built from `config`.
    ///
    /// A timeout set earlier with [`set_timeout`](Self::set_timeout) becomes
    /// the pool's write deadline. The previous sink is released, not closed.
    pub fn use_pool_with(&self, config: PoolConfig) -> Result<(), PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        let pool = ConnectionPool::with_config(config)?;
        if let Some(timeout) = *self.timeout.lock() {
            pool.set_write_deadline(Some(Instant::now() + timeout));
        }
        *self.delivery.sink.write() = Arc::new(pool);
        Ok(())
    }

    /// Set a write deadline `timeout` from now on the current sink.
    ///
    /// The timeout is remembered and applied to a pool installed later.
    pub fn set_timeout(&self, timeout: Duration) -> io::Result<()> {
        *self.timeout.lock() = Some(timeout);
        self.delivery
            .sink()
            .set_write_deadline(Some(Instant::now() + timeout))
    }

    /// Drain outstanding entries, stop the worker and close the sink.
    ///
    /// Later calls to [`fire`](Self::fire) fail with
    /// [`DeliveryError::Closed`]. Calling `close` twice is harmless.
    pub fn close(&self) -> io::Result<()> {
        self.shutdown(None)
    }

    fn shutdown(&self, limit: Option<Duration>) -> io::Result<()> {
        {
            let mut gate = self.gate.write();
            if matches!(*gate, Dispatch::Closed(_)) {
                return Ok(());
            }
            let mode = gate.mode();
            // Dropping the sender lets the worker exit once the queue is empty.
            *gate = Dispatch::Closed(mode);
        }
        let drained = match limit {
            Some(limit) => self.delivery.pending.wait_for(limit),
            None => {
                self.delivery.pending.wait();
                true
            }
        };
        if !drained {
            warn!(
                "stashhook: {} entries still pending at shutdown",
                self.delivery.pending.get()
            );
        }
        self.join_worker(limit);
        self.delivery.report_drops();
        self.delivery.sink().close()
    }

    fn join_worker(&self, limit: Option<Duration>) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if let Some(limit) = limit {
            if worker.done_rx.recv_timeout(limit).is_err() {
                // Detach the thread so shutdown continues
                warn!("stashhook: delivery worker did not shut down within {limit:?}");
                return;
            }
        }
        if worker.handle.join().is_err() {
            warn!("stashhook: delivery worker panicked");
        }
    }
}

fn spawn_worker(delivery: Arc<Delivery>, rx: Receiver<LogEntry>) -> io::Result<Worker> {
    let (done_tx, done_rx) = bounded(1);
    let handle = thread::Builder::new()
        .name("stashhook-drain".into())
        .spawn(move || {
            for entry in rx {
                delivery.deliver_or_warn(&entry);
                delivery.pending.done();
            }
            let _ = done_tx.send(());
        })?;
    Ok(Worker { handle, done_rx })
}

impl Drop for Hook {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown(Some(DROP_TIMEOUT)) {
            warn!("stashhook: failed to close sink: {err}");
        }
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("mode", &self.mode())
            .field("levels", &self.levels())
            .field("pending", &self.delivery.pending.get())
            .field("formatter", &self.delivery.formatter)
            .finish()
    }
}
