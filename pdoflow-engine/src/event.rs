//! Bit mask signalling between the dispatch thread and application threads
//!
//! Receive hooks run on the dispatch thread and must not block, so they hand fresh data to the
//! application by OR-ing a bit into an [`EventSignal`]. Application threads clear the bits they
//! are interested in, then block until an [`Event`] predicate over the mask is satisfied.
//!
//! ```
//! use std::time::Duration;
//! use pdoflow_engine::{Event, EventSignal};
//!
//! let signal = EventSignal::new();
//! signal.set_bits(0b01);
//! let event = Event::Any(0b11);
//! assert_eq!(Ok(0b01), event.wait(&signal, Some(Duration::from_millis(10))));
//! ```
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::WaitError;

/// A predicate over an event mask
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// Satisfied when any bit of the mask is set
    Any(u32),
    /// Satisfied when all bits of the mask are set
    All(u32),
}

impl Event {
    /// Test the predicate against a mask value
    pub fn is_satisfied(&self, value: u32) -> bool {
        match *self {
            Event::Any(mask) => value & mask != 0,
            Event::All(mask) => value & mask == mask,
        }
    }

    /// Block until the predicate holds on `signal`
    ///
    /// Shortcut for [`EventSignal::wait`].
    pub fn wait(&self, signal: &EventSignal, timeout: Option<Duration>) -> Result<u32, WaitError> {
        signal.wait(self, timeout)
    }
}

/// A shared bit mask with blocking waits
///
/// The mask and the condition variable are protected by one mutex, and every predicate check
/// happens under it, so a `set_bits` racing with the start of a wait is never lost.
#[derive(Debug, Default)]
pub struct EventSignal {
    mask: Mutex<u32>,
    changed: Condvar,
}

impl EventSignal {
    /// Create a signal with all bits clear
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, u32> {
        self.mask.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// OR bits into the mask and wake all waiters
    pub fn set_bits(&self, bits: u32) {
        let mut mask = self.lock();
        *mask |= bits;
        self.changed.notify_all();
    }

    /// Clear bits from the mask
    pub fn clear_bits(&self, bits: u32) {
        let mut mask = self.lock();
        *mask &= !bits;
    }

    /// Replace the whole mask and wake all waiters
    pub fn set_mask(&self, value: u32) {
        let mut mask = self.lock();
        *mask = value;
        self.changed.notify_all();
    }

    /// Read the current mask
    pub fn mask(&self) -> u32 {
        *self.lock()
    }

    /// Block until `event` is satisfied, or the timeout elapses
    ///
    /// Returns the mask value which satisfied the predicate. Bits are not cleared; call
    /// [`clear_bits`](Self::clear_bits) before the next wait. A timeout of None waits forever.
    pub fn wait(&self, event: &Event, timeout: Option<Duration>) -> Result<u32, WaitError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut mask = self.lock();
        loop {
            if event.is_satisfied(*mask) {
                return Ok(*mask);
            }
            match deadline {
                None => {
                    mask = self
                        .changed
                        .wait(mask)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(WaitError::Timeout);
                    }
                    mask = self
                        .changed
                        .wait_timeout(mask, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        let any = Event::Any(0b101);
        assert!(any.is_satisfied(0b001));
        assert!(any.is_satisfied(0b100));
        assert!(!any.is_satisfied(0b010));

        let all = Event::All(0b101);
        assert!(!all.is_satisfied(0b001));
        assert!(all.is_satisfied(0b111));
    }

    #[test]
    fn test_set_clear() {
        let signal = EventSignal::new();
        signal.set_bits(0b110);
        signal.clear_bits(0b010);
        assert_eq!(0b100, signal.mask());
        signal.set_mask(0b1);
        assert_eq!(0b1, signal.mask());
    }

    #[test]
    fn test_timeout_without_bits() {
        let signal = EventSignal::new();
        assert_eq!(
            Err(WaitError::Timeout),
            signal.wait(&Event::Any(1), Some(Duration::ZERO))
        );
    }

    #[serial_test::serial]
    #[test]
    fn test_waiter_woken_by_other_thread() {
        let signal = std::sync::Arc::new(EventSignal::new());
        let setter = signal.clone();
        let start = Instant::now();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            setter.set_bits(0b10);
            std::thread::sleep(Duration::from_millis(5));
            setter.set_bits(0b01);
        });

        let result = Event::All(0b11).wait(&signal, Some(Duration::from_secs(1)));
        handle.join().unwrap();
        assert_eq!(Ok(0b11), result);
        assertables::assert_lt!(start.elapsed(), Duration::from_millis(500));
    }
}
