//! Bounded pool of reusable items backed by a crossbeam channel.
//!
//! Idle items wait in a bounded channel. A lease takes an idle item or, when
//! none is waiting and fewer than `max_cap` items are live, creates one with
//! the factory. At capacity the lease blocks until an item is returned or a
//! live slot is freed by an eviction. Returned items go back to the channel;
//! items marked unusable are dropped instead.

use std::{
    io,
    ops::{Deref, DerefMut},
    sync::Arc,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use parking_lot::Mutex;

use super::PoolError;

/// Creates a new item for the pool.
pub(crate) type Factory<T> = Box<dyn Fn() -> io::Result<T> + Send + Sync>;

/// How long a blocked lease waits before re-checking for a free slot.
const SLOT_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Slots<T> {
    idle_tx: Sender<T>,
    idle_rx: Receiver<T>,
}

struct State<T> {
    /// `None` once the pool is closed.
    slots: Option<Slots<T>>,
    /// Items currently idle or on lease.
    live: usize,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    max_cap: usize,
    factory: Factory<T>,
}

pub(crate) struct ChannelPool<T> {
    shared: Arc<Shared<T>>,
}

enum Reservation<T> {
    Idle(T),
    Create,
    Wait(Receiver<T>),
}

impl<T: Send + 'static> ChannelPool<T> {
    /// Build a pool and eagerly create `min_idle` items.
    pub(crate) fn new(
        min_idle: usize,
        max_cap: usize,
        factory: Factory<T>,
    ) -> Result<Self, PoolError> {
        if max_cap == 0 || min_idle > max_cap {
            return Err(PoolError::InvalidCapacity);
        }
        let (idle_tx, idle_rx) = bounded(max_cap);
        for _ in 0..min_idle {
            let item = factory().map_err(PoolError::FillFailed)?;
            idle_tx.send(item).map_err(|_| PoolError::Closed)?;
        }
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    slots: Some(Slots { idle_tx, idle_rx }),
                    live: min_idle,
                }),
                max_cap,
                factory,
            }),
        })
    }

    /// Lease an item, creating one if the pool has spare capacity.
    pub(crate) fn get(&self) -> Result<Leased<T>, PoolError> {
        loop {
            match self.reserve()? {
                Reservation::Idle(item) => return Ok(self.lease(item)),
                Reservation::Create => return self.create(),
                Reservation::Wait(idle_rx) => match idle_rx.recv_timeout(SLOT_POLL_INTERVAL) {
                    Ok(item) => return Ok(self.lease(item)),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return Err(PoolError::Closed),
                },
            }
        }
    }

    fn reserve(&self) -> Result<Reservation<T>, PoolError> {
        let mut state = self.shared.state.lock();
        let can_create = state.live < self.shared.max_cap;
        let reservation = {
            let slots = state.slots.as_ref().ok_or(PoolError::Closed)?;
            match slots.idle_rx.try_recv() {
                Ok(item) => Reservation::Idle(item),
                Err(TryRecvError::Disconnected) => return Err(PoolError::Closed),
                Err(TryRecvError::Empty) if can_create => Reservation::Create,
                Err(TryRecvError::Empty) => Reservation::Wait(slots.idle_rx.clone()),
            }
        };
        if matches!(reservation, Reservation::Create) {
            state.live += 1;
        }
        Ok(reservation)
    }

    fn create(&self) -> Result<Leased<T>, PoolError> {
        match (self.shared.factory)() {
            Ok(item) => Ok(self.lease(item)),
            Err(err) => {
                self.shared.release_slot();
                Err(PoolError::Dial(err))
            }
        }
    }

    fn lease(&self, item: T) -> Leased<T> {
        Leased {
            item: Some(item),
            shared: Arc::clone(&self.shared),
            unusable: false,
        }
    }

    /// Drop every idle item and refuse further leases.
    pub(crate) fn close(&self) {
        let slots = {
            let mut state = self.shared.state.lock();
            state.slots.take()
        };
        if let Some(Slots { idle_tx, idle_rx }) = slots {
            drop(idle_tx);
            let drained = idle_rx.try_iter().count();
            let mut state = self.shared.state.lock();
            state.live = state.live.saturating_sub(drained);
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.state.lock().slots.is_none()
    }

    /// Number of idle items and number of live (idle or leased) items.
    pub(crate) fn counts(&self) -> (usize, usize) {
        let state = self.shared.state.lock();
        let idle = state.slots.as_ref().map_or(0, |slots| slots.idle_rx.len());
        (idle, state.live)
    }
}

impl<T> Shared<T> {
    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.live = state.live.saturating_sub(1);
    }

    fn give_back(&self, item: T) {
        let mut state = self.state.lock();
        let returned = match &state.slots {
            Some(slots) => slots.idle_tx.try_send(item).is_ok(),
            None => false,
        };
        if !returned {
            state.live = state.live.saturating_sub(1);
        }
    }
}

/// An item on loan from the pool.
///
/// Dropping the lease returns the item, unless it was marked unusable or the
/// pool has been closed, in which case the item is dropped.
pub(crate) struct Leased<T> {
    item: Option<T>,
    shared: Arc<Shared<T>>,
    unusable: bool,
}

impl<T> Leased<T> {
    /// Evict the item instead of returning it to the pool.
    pub(crate) fn mark_unusable(&mut self) {
        self.unusable = true;
    }
}

impl<T> Deref for Leased<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("leased item present until drop")
    }
}

impl<T> DerefMut for Leased<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("leased item present until drop")
    }
}

impl<T> Drop for Leased<T> {
    fn drop(&mut self) {
        let Some(item) = self.item.take() else {
            return;
        };
        if self.unusable {
            drop(item);
            self.shared.release_slot();
        } else {
            self.shared.give_back(item);
        }
    }
}
