//! Fixtures providing hooks over in-memory sinks and a loopback collector.

#![allow(dead_code)]

use std::{
    io::Read,
    net::{SocketAddr, TcpListener},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use rstest::fixture;
use stashhook::{FormatError, Hook, LogEntry};

use super::shared_buffer::SharedBuf;

/// Formatter rendering `msg: "<message>"`.
pub fn quoted(entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
    Ok(format!("msg: {:?}", entry.message).into_bytes())
}

/// Formatter rendering one message per line.
pub fn line(entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
    Ok(format!("{}\n", entry.message).into_bytes())
}

/// Return a synchronous hook writing lines into a fresh buffer.
#[fixture]
pub fn hook_tuple() -> (SharedBuf, Hook) {
    let buffer = SharedBuf::default();
    let hook = Hook::new(buffer.clone(), line);
    (buffer, hook)
}

/// Loopback TCP server collecting every byte it receives.
pub struct Collector {
    pub addr: SocketAddr,
    received: mpsc::Receiver<Vec<u8>>,
}

impl Collector {
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    /// Collect bytes until `expected` have arrived or `timeout` elapses.
    pub fn read_bytes(&self, expected: usize, timeout: Duration) -> Vec<u8> {
        let deadline = Instant::now() + timeout;
        let mut out = Vec::new();
        while out.len() < expected {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.received.recv_timeout(left) {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(_) => break,
            }
        }
        out
    }

    /// Collect bytes up to and including the first newline.
    pub fn read_line(&self, timeout: Duration) -> String {
        let deadline = Instant::now() + timeout;
        let mut out = Vec::new();
        while !out.contains(&b'\n') {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.received.recv_timeout(left) {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(_) => break,
            }
        }
        String::from_utf8(out).expect("collector received UTF-8")
    }
}

#[fixture]
pub fn collector() -> Collector {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
    let addr = listener.local_addr().expect("listener has address");
    let (tx, received) = mpsc::channel();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { return };
            let tx = tx.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 1024];
                while let Ok(n) = stream.read(&mut buf) {
                    if n == 0 || tx.send(buf[..n].to_vec()).is_err() {
                        return;
                    }
                }
            });
        }
    });
    Collector { addr, received }
}

/// Address on which nothing listens.
pub fn unreachable_host() -> String {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    addr.to_string()
}
