//! Count of submitted entries not yet attempted.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub(crate) struct PendingCount {
    count: Mutex<usize>,
    drained: Condvar,
}

impl PendingCount {
    pub(crate) fn add(&self) {
        *self.count.lock() += 1;
    }

    /// Record one finished attempt, waking waiters once nothing is pending.
    pub(crate) fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    pub(crate) fn get(&self) -> usize {
        *self.count.lock()
    }

    /// Block until the count reaches zero.
    pub(crate) fn wait(&self) {
        let mut count = self.count.lock();
        self.drained.wait_while(&mut count, |count| *count > 0);
    }

    /// Block until the count reaches zero or `timeout` elapses.
    ///
    /// Returns `true` when the count drained.
    pub(crate) fn wait_for(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        self.drained
            .wait_while_for(&mut count, |count| *count > 0, timeout);
        *count == 0
    }
}
