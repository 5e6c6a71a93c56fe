//! Simulated discrete clock for deterministic testing.
//!
//! Time advances only when explicitly told to. The simulated card
//! advances a [`SharedClock`] by a fixed amount per transferred byte,
//! which makes the driver's bounded polling loops terminate (or time
//! out) deterministically.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use fv_card::Clock;

/// Simulated clock with nanosecond precision.
#[derive(Debug, Clone)]
pub struct SimClock {
    /// Current time in nanoseconds since simulation start.
    now_ns: u64,
}

impl SimClock {
    /// Creates a new clock starting at time zero.
    pub fn new() -> Self {
        Self { now_ns: 0 }
    }

    /// Returns the current simulated time in nanoseconds.
    #[inline]
    pub fn now(&self) -> u64 {
        self.now_ns
    }

    /// Advances the clock by the specified number of nanoseconds.
    pub fn advance_by(&mut self, delta_ns: u64) {
        self.now_ns = self.now_ns.checked_add(delta_ns).expect("clock overflow");
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a [`SimClock`].
///
/// The driver holds one clone as its [`Clock`] source; the simulated
/// card holds another and advances it per bus byte. Simulation is
/// single-threaded, so this is `Rc<RefCell<_>>` rather than `Arc`.
#[derive(Debug, Clone, Default)]
pub struct SharedClock(Rc<RefCell<SimClock>>);

impl SharedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the underlying clock.
    pub fn advance_by(&self, delta_ns: u64) {
        self.0.borrow_mut().advance_by(delta_ns);
    }

    /// Current simulated time in nanoseconds.
    pub fn now_ns(&self) -> u64 {
        self.0.borrow().now()
    }
}

impl Clock for SharedClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_ns())
    }
}

/// Converts milliseconds to nanoseconds.
#[inline]
pub const fn ms_to_ns(ms: u64) -> u64 {
    ms * 1_000_000
}

/// Converts nanoseconds to milliseconds (truncating).
#[inline]
pub const fn ns_to_ms(ns: u64) -> u64 {
    ns / 1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_starts_at_zero_and_advances() {
        let mut clock = SimClock::new();
        assert_eq!(clock.now(), 0);

        clock.advance_by(ms_to_ns(1));
        assert_eq!(clock.now(), 1_000_000);
        assert_eq!(ns_to_ms(clock.now()), 1);
    }

    #[test]
    fn shared_clock_is_visible_through_all_handles() {
        let a = SharedClock::new();
        let b = a.clone();

        a.advance_by(500);
        assert_eq!(b.now_ns(), 500);
        assert_eq!(Clock::now(&b), Duration::from_nanos(500));
    }
}
