//! Health-aware host selection.
//!
//! Every candidate host is either [`HostHealth::Healthy`] or
//! [`HostHealth::Unhealthy`]. A failed dial or write moves a host to
//! `Unhealthy` and schedules a retry time; the next successful dial moves it
//! back. Selection walks the host list round-robin and skips unhealthy hosts
//! whose retry time has not arrived. When every host is waiting, the one that
//! becomes eligible first is returned anyway, so no host is ever excluded for
//! good.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use super::backoff::{Backoff, RetryPolicy};

/// Health of a single candidate host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostHealth {
    Healthy,
    Unhealthy {
        /// Consecutive failures since the host was last healthy.
        failures: u32,
        /// Earliest time the host is eligible for selection again.
        retry_at: Instant,
    },
}

impl HostHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HostHealth::Healthy)
    }

    fn eligible_at(&self, now: Instant) -> bool {
        match self {
            HostHealth::Healthy => true,
            HostHealth::Unhealthy { retry_at, .. } => *retry_at <= now,
        }
    }

    fn retry_at(&self) -> Option<Instant> {
        match self {
            HostHealth::Healthy => None,
            HostHealth::Unhealthy { retry_at, .. } => Some(*retry_at),
        }
    }
}

struct HostEntry {
    host: Arc<str>,
    health: HostHealth,
}

struct SelectorState {
    entries: Vec<HostEntry>,
    next: usize,
    backoff: Backoff,
    closed: bool,
}

/// Picks hosts for new connections and tracks their health.
pub struct HostSelector {
    state: Mutex<SelectorState>,
}

impl HostSelector {
    pub fn new<I, S>(hosts: I, policy: RetryPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = hosts
            .into_iter()
            .map(|host| HostEntry {
                host: Arc::from(host.as_ref()),
                health: HostHealth::Healthy,
            })
            .collect();
        Self {
            state: Mutex::new(SelectorState {
                entries,
                next: 0,
                backoff: Backoff::new(policy),
                closed: false,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Choose the next host to dial, or `None` once closed or empty.
    pub fn select(&self) -> Option<Arc<str>> {
        self.select_at(Instant::now())
    }

    fn select_at(&self, now: Instant) -> Option<Arc<str>> {
        let mut state = self.state.lock();
        if state.closed || state.entries.is_empty() {
            return None;
        }
        let count = state.entries.len();
        let start = state.next;
        let eligible = (0..count)
            .map(|offset| (start + offset) % count)
            .find(|&idx| state.entries[idx].health.eligible_at(now));
        let idx = match eligible {
            Some(idx) => idx,
            None => state
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, entry)| entry.health.retry_at())
                .map(|(idx, _)| idx)?,
        };
        state.next = (idx + 1) % count;
        Some(Arc::clone(&state.entries[idx].host))
    }

    /// Record a failed dial or write against `host`.
    pub fn mark_failed(&self, host: &str) {
        self.mark_failed_at(host, Instant::now());
    }

    fn mark_failed_at(&self, host: &str, now: Instant) {
        let mut state = self.state.lock();
        let SelectorState {
            entries, backoff, ..
        } = &mut *state;
        let Some(entry) = entries.iter_mut().find(|entry| &*entry.host == host) else {
            return;
        };
        let failures = match entry.health {
            HostHealth::Healthy => 1,
            HostHealth::Unhealthy { failures, .. } => failures.saturating_add(1),
        };
        let delay: Duration = backoff.delay(failures);
        entry.health = HostHealth::Unhealthy {
            failures,
            retry_at: now + delay,
        };
        log::debug!("stashhook: host {host} unhealthy after {failures} failure(s); retry in {delay:?}");
    }

    /// Record a successful dial to `host`, restoring it to healthy.
    pub fn mark_success(&self, host: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.iter_mut().find(|entry| &*entry.host == host) {
            if !entry.health.is_healthy() {
                log::debug!("stashhook: host {host} recovered");
            }
            entry.health = HostHealth::Healthy;
        }
    }

    /// Current health of every host, in configuration order.
    pub fn snapshot(&self) -> Vec<(String, HostHealth)> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|entry| (entry.host.to_string(), entry.health))
            .collect()
    }

    /// Stop handing out hosts.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }
}
