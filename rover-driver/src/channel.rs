//! Single-slot channel where the latest value wins.
//!
//! Publishing overwrites any value the receiver has not taken yet. The lock
//! is only held to swap the slot, never while the receiver acts on a value.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Slot<T> {
    value: Option<T>,
    closed: bool,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

/// Creates a connected sender/receiver pair.
pub fn latest<T>() -> (LatestSender<T>, LatestReceiver<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            value: None,
            closed: false,
        }),
        ready: Condvar::new(),
    });
    (
        LatestSender {
            shared: shared.clone(),
        },
        LatestReceiver { shared },
    )
}

/// Value rejected because the channel was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed<T>(pub T);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received<T> {
    Value(T),
    /// Nothing was published before the deadline.
    Timeout,
    /// Nothing is pending right now.
    Empty,
    Closed,
}

pub struct LatestSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for LatestSender<T> {
    fn clone(&self) -> Self {
        LatestSender {
            shared: self.shared.clone(),
        }
    }
}

impl<T> LatestSender<T> {
    /// Stores `value`, returning the unconsumed value it replaced.
    pub fn publish(&self, value: T) -> Result<Option<T>, Closed<T>> {
        let superseded = {
            let mut slot = self.shared.slot.lock();
            if slot.closed {
                return Err(Closed(value));
            }
            slot.value.replace(value)
        };
        self.shared.ready.notify_one();
        Ok(superseded)
    }

    /// Closes the channel and drops any pending value. The receiver wakes up with `Closed`.
    pub fn close(&self) {
        {
            let mut slot = self.shared.slot.lock();
            slot.closed = true;
            slot.value = None;
        }
        self.shared.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.slot.lock().closed
    }
}

pub struct LatestReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> LatestReceiver<T> {
    /// Blocks until a value is available. `None` once the channel is closed.
    pub fn recv(&self) -> Option<T> {
        let mut slot = self.shared.slot.lock();
        loop {
            if slot.closed {
                return None;
            }
            if let Some(value) = slot.value.take() {
                return Some(value);
            }
            self.shared.ready.wait(&mut slot);
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Received<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock();
        loop {
            if slot.closed {
                return Received::Closed;
            }
            if let Some(value) = slot.value.take() {
                return Received::Value(value);
            }
            if self.shared.ready.wait_until(&mut slot, deadline).timed_out() {
                return match slot.value.take() {
                    Some(value) => Received::Value(value),
                    None if slot.closed => Received::Closed,
                    None => Received::Timeout,
                };
            }
        }
    }

    pub fn try_recv(&self) -> Received<T> {
        let mut slot = self.shared.slot.lock();
        if slot.closed {
            return Received::Closed;
        }
        match slot.value.take() {
            Some(value) => Received::Value(value),
            None => Received::Empty,
        }
    }
}
