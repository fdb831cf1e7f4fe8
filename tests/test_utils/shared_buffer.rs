//! In-memory sinks for integration tests.

#![allow(dead_code)]

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;
use stashhook::Sink;

/// Thread-safe byte buffer usable as a hook sink.
///
/// Clones share the same buffer, so a test can keep one handle while the
/// hook owns another.
#[derive(Clone, Default)]
pub struct SharedBuf {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuf {
    /// Return a snapshot of the buffer contents.
    #[allow(dead_code)]
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    #[allow(dead_code)]
    pub fn read_output(&self) -> String {
        String::from_utf8(self.contents()).expect("Buffer contains invalid UTF-8")
    }
}

impl Sink for SharedBuf {
    fn write(&self, data: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(data);
        Ok(data.len())
    }
}

/// Sink rejecting every write while counting the attempts.
#[derive(Clone, Default)]
pub struct FailingSink {
    attempts: Arc<AtomicUsize>,
}

impl FailingSink {
    #[allow(dead_code)]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Sink for FailingSink {
    fn write(&self, _data: &[u8]) -> io::Result<usize> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "collector went away",
        ))
    }
}
