//! # fv-sim: Deterministic simulation testing for `FieldVault`
//!
//! This crate provides the test doubles the storage subsystem is
//! verified against:
//!
//! - [`SimClock`] / [`SharedClock`]: discrete simulated time. The card
//!   driver's wall-clock timeouts expire deterministically because the
//!   simulated card advances the shared clock on every transferred
//!   byte, with no real waiting.
//! - [`SimRng`]: seeded RNG so fault scenarios reproduce exactly.
//! - [`SimCard`]: a behavioural model of an SPI flash card that
//!   decodes real command frames and produces real tokens, covering
//!   legacy, v2 standard-capacity and v2 high-capacity variants, with
//!   configurable protocol faults ([`SimCardConfig`]).
//! - [`MemBlockDevice`]: a plain in-memory block device for testing
//!   the log layers without the wire protocol in between.
//!
//! # Philosophy
//!
//! Same configuration → same byte sequence → same outcome. A failing
//! test names the exact protocol deviation it injected, and the
//! driver's typed error is asserted against it.

mod card;
mod clock;
mod device;
mod rng;

pub use card::{CardVariant, SimCard, SimCardConfig, SimCardStats};
pub use clock::{SharedClock, SimClock, ms_to_ns, ns_to_ms};
pub use device::MemBlockDevice;
pub use rng::SimRng;
