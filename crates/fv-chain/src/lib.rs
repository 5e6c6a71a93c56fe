//! # fv-chain: Append log codec for `FieldVault`
//!
//! This crate implements the deterministic, lossless mapping between a
//! [`LogRecord`] and its canonical textual line, and the SHA-256 hash
//! chain computed over that exact text.
//!
//! # Canonical line format
//!
//! ```text
//! timestamp,rf_power_dbm,lat,lon,altitude,activity,prev_hash
//!    |          2dp       6dp  6dp   1dp     label    64 hex
//! ```
//!
//! The numeric formatting rules are load-bearing: the hash of a
//! serialized line must be reproducible byte-for-byte by any
//! implementation that re-derives the same field values, so the
//! precision of every field is part of the wire contract.
//!
//! # Hash chain
//!
//! Each line closes with a `prev_hash` field holding the SHA-256 digest
//! (64 lowercase hex characters) of the *previous* canonical line. The
//! first record carries the all-zeros [`GENESIS`] constant instead:
//!
//! ```text
//! line 0: ...,0000...0000          <- genesis constant
//! line 1: ...,sha256(line 0)
//! line 2: ...,sha256(line 1)
//! ```
//!
//! A line's own hash therefore seeds the *next* line, never itself.
//!
//! # Example
//!
//! ```
//! use fv_chain::{line_hash, LogRecord, GENESIS};
//! use fv_types::{Activity, Sample};
//!
//! let sample = Sample {
//!     timestamp: "2026-03-14T09:26:53".into(),
//!     rf_power_dbm: -61.327,
//!     lat: 51.4700123,
//!     lon: -0.4542987,
//!     altitude_m: 24.71,
//!     activity: Activity::Still,
//! };
//!
//! let record = LogRecord::from_sample(&sample, GENESIS);
//! let line = record.canonical_line();
//! assert!(line.ends_with(&"0".repeat(64)));
//!
//! // The next record's prev_hash field:
//! let head = line_hash(&line);
//! ```

mod error;
mod hash;
mod record;

pub use error::CodecError;
pub use hash::{ChainHash, GENESIS, HASH_LENGTH, line_hash};
pub use record::{LogRecord, SCHEMA_HEADER};
