//! Transport primitives shared by [`TcpSink`](crate::TcpSink) and the
//! connection pool.

use std::{
    io::{self, Write},
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use native_tls::{TlsConnector, TlsStream};

/// TLS connection options.
#[derive(Clone, Debug, Default)]
pub struct TlsOptions {
    /// Domain presented during the handshake. Defaults to the dialled host name.
    pub domain: Option<String>,
    /// Skip certificate validation when true (intended for tests).
    pub insecure_skip_verify: bool,
}

impl TlsOptions {
    fn connector(&self) -> io::Result<TlsConnector> {
        let mut builder = TlsConnector::builder();
        if self.insecure_skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build().map_err(io::Error::other)
    }
}

/// A live connection to a collector.
pub enum NetConnection {
    PlainTcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl NetConnection {
    fn tcp(&self) -> &TcpStream {
        match self {
            NetConnection::PlainTcp(stream) => stream,
            NetConnection::Tls(stream) => stream.get_ref(),
        }
    }

    /// Update the write timeout for the underlying socket.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.tcp().set_write_timeout(timeout)
    }

    /// Write a full buffer to the socket and flush it.
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            NetConnection::PlainTcp(stream) => stream.write_all(buf).and_then(|()| stream.flush()),
            NetConnection::Tls(stream) => stream.write_all(buf).and_then(|()| stream.flush()),
        }
    }

    pub fn shutdown(&mut self) -> io::Result<()> {
        match self {
            NetConnection::PlainTcp(stream) => stream.shutdown(std::net::Shutdown::Both),
            NetConnection::Tls(stream) => stream.shutdown(),
        }
    }
}

impl std::fmt::Debug for NetConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            NetConnection::PlainTcp(_) => "tcp",
            NetConnection::Tls(_) => "tls",
        };
        f.debug_struct("NetConnection")
            .field("kind", &kind)
            .field("peer", &self.tcp().peer_addr().ok())
            .finish()
    }
}

/// Dial `host` (`"name:port"`) over TCP, trying every resolved address.
///
/// Errors are prefixed with `dial tcp <host>` and keep the kind of the last
/// failed attempt.
pub fn connect_tcp(host: &str, timeout: Duration) -> io::Result<TcpStream> {
    let annotate = |err: io::Error| io::Error::new(err.kind(), format!("dial tcp {host}: {err}"));
    let addrs = host.to_socket_addrs().map_err(annotate)?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nonblocking(false).map_err(annotate)?;
                stream.set_nodelay(true).map_err(annotate)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(annotate(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")
    })))
}

/// Establish a connection, upgrading to TLS when `tls` is set.
pub fn connect(
    host: &str,
    connect_timeout: Duration,
    tls: Option<&TlsOptions>,
) -> io::Result<NetConnection> {
    let stream = connect_tcp(host, connect_timeout)?;
    let Some(tls) = tls else {
        return Ok(NetConnection::PlainTcp(stream));
    };
    let connector = tls.connector()?;
    let domain = match &tls.domain {
        Some(domain) => domain.clone(),
        None => host_name(host).to_owned(),
    };
    stream.set_read_timeout(Some(connect_timeout))?;
    stream.set_write_timeout(Some(connect_timeout))?;
    let stream = connector
        .connect(&domain, stream)
        .map_err(|err| io::Error::other(format!("tls handshake with {host}: {err}")))?;
    let tcp_ref = stream.get_ref();
    tcp_ref.set_read_timeout(None)?;
    tcp_ref.set_write_timeout(None)?;
    Ok(NetConnection::Tls(Box::new(stream)))
}

fn host_name(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, _port)) => name.trim_start_matches('[').trim_end_matches(']'),
        None => host,
    }
}
