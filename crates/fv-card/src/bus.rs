//! Bus transport trait, clock abstraction and the bounded-poll primitive.

use std::time::{Duration, Instant};

/// Bus clock rate selection.
///
/// Cards must be negotiated at a reduced rate; once the driver is
/// Ready the bus is raised to operating speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusSpeed {
    /// Identification rate (on the order of 250 kHz).
    Init,
    /// Full operating rate (on the order of 10 MHz).
    Operating,
}

/// Synchronous, full-duplex serial transport with an explicit
/// chip-select line.
///
/// The transport is electrically infallible from the driver's point of
/// view: bytes always clock through. Protocol failures show up as the
/// card answering with nothing but idle (`0xFF`) bytes, which the
/// driver turns into typed timeouts.
pub trait SpiBus {
    /// Clocks out `data`, discarding whatever the card sends back.
    fn write(&mut self, data: &[u8]);

    /// Clocks in `buf.len()` bytes while sending `fill` on the out line.
    fn read_into(&mut self, buf: &mut [u8], fill: u8);

    /// Selects the bus clock rate.
    fn set_speed(&mut self, speed: BusSpeed);

    /// Drives the chip-select line; `true` asserts (selects the card).
    fn chip_select(&mut self, selected: bool);
}

/// Monotonic time source for deadline-bounded polling.
///
/// Production code uses [`WallClock`]; the simulation harness provides
/// a discrete clock advanced per bus transfer, so timeout paths are
/// testable without real waiting.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall-clock [`Clock`] backed by a monotonic [`Instant`].
#[derive(Debug, Clone)]
pub struct WallClock {
    start: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Repeatedly evaluates `f` until it yields a value or `timeout` passes.
///
/// This is the single bounded-retry primitive behind every wait in the
/// driver: command-response polling, start-of-block token polling,
/// write-busy polling and the operating-condition negotiation loop.
///
/// `f` is always attempted at least once, even with a zero timeout.
/// Returns `None` when the deadline passed without a value.
pub fn poll_until<C, T, F>(clock: &C, timeout: Duration, mut f: F) -> Option<T>
where
    C: Clock + ?Sized,
    F: FnMut() -> Option<T>,
{
    let deadline = clock.now() + timeout;
    loop {
        if let Some(value) = f() {
            return Some(value);
        }
        if clock.now() >= deadline {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Test clock that advances a fixed step every time it is read.
    struct SteppingClock {
        now_ms: Cell<u64>,
        step_ms: u64,
    }

    impl Clock for SteppingClock {
        fn now(&self) -> Duration {
            let now = self.now_ms.get();
            self.now_ms.set(now + self.step_ms);
            Duration::from_millis(now)
        }
    }

    #[test]
    fn returns_first_value() {
        let clock = SteppingClock {
            now_ms: Cell::new(0),
            step_ms: 1,
        };
        let mut attempts = 0;
        let result = poll_until(&clock, Duration::from_millis(100), || {
            attempts += 1;
            (attempts == 3).then_some(attempts)
        });
        assert_eq!(result, Some(3));
    }

    #[test]
    fn expires_when_predicate_never_fires() {
        let clock = SteppingClock {
            now_ms: Cell::new(0),
            step_ms: 10,
        };
        let result: Option<()> = poll_until(&clock, Duration::from_millis(50), || None);
        assert_eq!(result, None);
    }

    #[test]
    fn zero_timeout_still_attempts_once() {
        let clock = SteppingClock {
            now_ms: Cell::new(0),
            step_ms: 1,
        };
        let result = poll_until(&clock, Duration::ZERO, || Some(42));
        assert_eq!(result, Some(42));
    }
}
