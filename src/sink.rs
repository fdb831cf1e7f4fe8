//! Byte-oriented delivery targets.
//!
//! A [`Sink`] receives the formatter's output verbatim. Sinks are shared
//! between caller threads and the hook's background delivery, so writes go
//! through `&self` and implementations serialise concurrent writers
//! themselves.

use std::{
    io::{self, Write},
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::transport::{NetConnection, TlsOptions, connect};

/// Write target for formatted entries.
pub trait Sink: Send + Sync {
    /// Write `data` in full, returning the number of bytes written.
    fn write(&self, data: &[u8]) -> io::Result<usize>;

    /// Record an absolute deadline for subsequent writes.
    ///
    /// `None` clears the deadline. Sinks without a notion of deadlines ignore
    /// the call.
    fn set_write_deadline(&self, _deadline: Option<Instant>) -> io::Result<()> {
        Ok(())
    }

    /// Release the resources held by the sink.
    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Reference-counted sink trait object.
pub type SharedSink = Arc<dyn Sink>;

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn write(&self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        (**self).set_write_deadline(deadline)
    }

    fn close(&self) -> io::Result<()> {
        (**self).close()
    }
}

/// Whether `err` is a temporary or timeout failure.
///
/// Connections failing this way are evicted from the pool and the write is
/// retried on a fresh connection.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Remaining time until `deadline`, or `None` once it has passed.
pub(crate) fn remaining(deadline: Option<Instant>, now: Instant) -> Option<Duration> {
    deadline
        .filter(|deadline| *deadline > now)
        .map(|deadline| deadline - now)
}

/// Adapts any [`io::Write`] into a [`Sink`].
///
/// Writers are locked for the duration of each payload so concurrent
/// deliveries never interleave bytes.
#[derive(Debug, Default)]
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut writer = self.writer.lock();
        writer.write_all(data)?;
        writer.flush()?;
        Ok(data.len())
    }

    fn close(&self) -> io::Result<()> {
        self.writer.lock().flush()
    }
}

/// A single connection to a collector.
///
/// The write deadline is absolute: each write is given whatever time remains
/// before it. A deadline that has already passed is not applied.
#[derive(Debug)]
pub struct TcpSink {
    conn: Mutex<NetConnection>,
    deadline: Mutex<Option<Instant>>,
}

impl TcpSink {
    /// Dial `host` (`"name:port"`), optionally over TLS.
    pub fn connect(host: &str, timeout: Duration, tls: Option<&TlsOptions>) -> io::Result<Self> {
        connect(host, timeout, tls).map(Self::from_connection)
    }

    pub fn from_connection(conn: NetConnection) -> Self {
        Self {
            conn: Mutex::new(conn),
            deadline: Mutex::new(None),
        }
    }
}

impl From<std::net::TcpStream> for TcpSink {
    fn from(stream: std::net::TcpStream) -> Self {
        Self::from_connection(NetConnection::PlainTcp(stream))
    }
}

impl Sink for TcpSink {
    fn write(&self, data: &[u8]) -> io::Result<usize> {
        let deadline = *self.deadline.lock();
        let mut conn = self.conn.lock();
        conn.set_write_timeout(remaining(deadline, Instant::now()))?;
        conn.write_all(data)?;
        Ok(data.len())
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        *self.deadline.lock() = deadline;
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        self.conn.lock().shutdown()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Read,
        net::TcpListener,
        sync::mpsc,
        thread,
    };

    use rstest::rstest;
    use static_assertions::assert_impl_all;

    use super::*;

    #[rstest]
    fn sinks_are_send_sync() {
        assert_impl_all!(WriterSink<Vec<u8>>: Send, Sync);
        assert_impl_all!(TcpSink: Send, Sync);
        assert_impl_all!(SharedSink: Send, Sync);
    }

    #[rstest]
    #[case(io::ErrorKind::TimedOut, true)]
    #[case(io::ErrorKind::WouldBlock, true)]
    #[case(io::ErrorKind::Interrupted, true)]
    #[case(io::ErrorKind::BrokenPipe, false)]
    #[case(io::ErrorKind::ConnectionRefused, false)]
    fn classifies_transient_errors(#[case] kind: io::ErrorKind, #[case] transient: bool) {
        assert_eq!(is_transient(&io::Error::from(kind)), transient);
    }

    #[rstest]
    fn past_deadlines_are_not_applied() {
        let now = Instant::now();
        assert_eq!(remaining(None, now), None);
        assert_eq!(remaining(Some(now), now), None);
        assert_eq!(
            remaining(Some(now + Duration::from_secs(2)), now),
            Some(Duration::from_secs(2))
        );
    }

    #[rstest]
    fn writer_sink_writes_whole_payloads() {
        let sink = WriterSink::new(Vec::new());
        assert_eq!(sink.write(b"abc").expect("write"), 3);
        assert_eq!(sink.write(b"def").expect("write"), 3);
        assert_eq!(sink.into_inner(), b"abcdef");
    }

    #[rstest]
    fn tcp_sink_delivers_with_deadline() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).expect("read");
            tx.send(buf).expect("send");
        });

        let sink = TcpSink::connect(&addr.to_string(), Duration::from_secs(1), None)
            .expect("connect");
        sink.set_write_deadline(Some(Instant::now() + Duration::from_secs(1)))
            .expect("deadline");
        assert_eq!(sink.write(b"sample data").expect("write"), 11);
        sink.close().expect("close");

        let received = rx.recv_timeout(Duration::from_secs(2)).expect("payload");
        assert_eq!(received, b"sample data");
    }
}
