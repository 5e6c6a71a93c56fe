//! # fv-card: Block storage driver for `FieldVault`
//!
//! This crate brings up a removable flash card over a synchronous SPI
//! bus and exposes block-granular read and write on top of it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ SdCard                                           │
//! │   bring-up state machine (CMD0 → CMD8 → ACMD41   │
//! │   → CMD58 → CMD16), CardIdentity, block I/O      │
//! ├──────────────────────────────────────────────────┤
//! │ frame: 6-byte command frames, R1 tokens          │
//! ├──────────────────────────────────────────────────┤
//! │ SpiBus trait: full-duplex transfer + chip-select │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! The electrical transport ([`SpiBus`]) is an external collaborator:
//! it moves bytes and never fails. Everything that can go wrong is a
//! protocol outcome, such as a missing token or an expired deadline,
//! and surfaces as a typed [`InitError`] or [`CardError`].
//!
//! # Concurrency model
//!
//! Single-threaded and blocking. Every operation runs to completion or
//! to a wall-clock timeout on the calling thread; there is no internal
//! locking because there is never more than one operation in flight.
//! All bounded waits go through one primitive, [`poll_until`].

mod bus;
mod card;
mod device;
mod error;
pub mod frame;

pub use bus::{BusSpeed, Clock, SpiBus, WallClock, poll_until};
pub use card::{Addressing, CardFamily, CardIdentity, SdCard};
pub use device::{BLOCK_SIZE, BlockDevice};
pub use error::{CardError, InitError};
