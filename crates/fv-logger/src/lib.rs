//! # fv-logger: Tamper-evident append log for `FieldVault`
//!
//! This crate turns a raw [`BlockDevice`](fv_card::BlockDevice) into a
//! hash-chained sample log:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │ verify: replay the chain, find the first divergence │
//! ├─────────────────────────────────────────────────────┤
//! │ LogWriter: batching, chain head, schema header      │
//! ├─────────────────────────────────────────────────────┤
//! │ BlockLog: NUL-terminated byte stream over blocks    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Durability model
//!
//! Appended records buffer in memory and reach the device in batches.
//! Losing power costs at most one unflushed batch; because each line's
//! prev_hash was fixed when the line was produced, the durable prefix
//! is always a complete, verifiable chain. On restart the writer
//! re-derives its head from the last durable line and continues the
//! chain seamlessly.
//!
//! # Tamper evidence
//!
//! [`verify`] replays the stored text against the chain rules and
//! reports the first index at which history disagrees with itself.
//! It detects modification, deletion and reordering of durable
//! records; it cannot detect truncation of a whole suffix, which is
//! indistinguishable from the log simply being shorter.

mod error;
mod stream;
mod verify;
mod writer;

pub use error::LogError;
pub use stream::BlockLog;
pub use verify::{VerificationResult, verify, verify_device};
pub use writer::{LogWriter, LoggerConfig};

#[cfg(test)]
mod tests;
