//! Log record and its canonical textual serialization.
//!
//! The serialization is the wire contract: every field's precision is
//! fixed because the hash chain covers the exact bytes of the line.

use fv_types::{Activity, Sample};

use crate::{ChainHash, CodecError, line_hash};

/// Fixed first line of every log, naming the schema.
///
/// Not part of the hash chain; a log whose header differs belongs to a
/// different logger generation.
pub const SCHEMA_HEADER: &str = "timestamp,rf_power_dbm,lat,lon,altitude,activity,prev_hash";

/// Number of comma-separated fields in a record line.
const FIELD_COUNT: usize = 7;

/// One record of the append-only log.
///
/// Records are created by the writer, appended once and never mutated.
/// `prev_hash` is the SHA-256 digest of the previous record's canonical
/// line, or [`GENESIS`](crate::GENESIS) for the first record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: String,
    pub rf_power_dbm: f64,
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
    pub activity: Activity,
    pub prev_hash: ChainHash,
}

impl LogRecord {
    /// Builds a record from a sensor sample and the current chain head.
    pub fn from_sample(sample: &Sample, prev_hash: ChainHash) -> Self {
        Self {
            timestamp: sample.timestamp.clone(),
            rf_power_dbm: sample.rf_power_dbm,
            lat: sample.lat,
            lon: sample.lon,
            altitude_m: sample.altitude_m,
            activity: sample.activity,
            prev_hash,
        }
    }

    /// Serializes the record to its canonical line (no trailing newline).
    ///
    /// Formatting is byte-exact and load-bearing: RF power at two
    /// decimal places, coordinates at six, altitude at one. Parsing a
    /// canonical line and re-serializing it reproduces it exactly.
    pub fn canonical_line(&self) -> String {
        format!(
            "{},{:.2},{:.6},{:.6},{:.1},{},{}",
            self.timestamp,
            self.rf_power_dbm,
            self.lat,
            self.lon,
            self.altitude_m,
            self.activity,
            self.prev_hash,
        )
    }

    /// The digest that the *next* record's prev_hash field must carry.
    pub fn next_prev_hash(&self) -> ChainHash {
        line_hash(&self.canonical_line())
    }

    /// Parses a canonical line back into a record.
    ///
    /// Strict: field count, numeric syntax, the activity label and
    /// the 64-hex hash tail are all validated. Any line this accepts
    /// re-serializes to the identical bytes.
    pub fn parse(line: &str) -> Result<Self, CodecError> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != FIELD_COUNT {
            return Err(CodecError::FieldCount {
                expected: FIELD_COUNT,
                found: fields.len(),
            });
        }

        let timestamp = fields[0];
        if timestamp.is_empty() {
            return Err(CodecError::MalformedTimestamp(timestamp.to_string()));
        }

        let rf_power_dbm = parse_fixed(fields[1], "rf_power_dbm", 2)?;
        let lat = parse_fixed(fields[2], "lat", 6)?;
        let lon = parse_fixed(fields[3], "lon", 6)?;
        let altitude_m = parse_fixed(fields[4], "altitude", 1)?;

        let activity = Activity::from_label(fields[5])
            .ok_or_else(|| CodecError::UnknownActivity(fields[5].to_string()))?;

        let prev_hash = ChainHash::parse_hex(fields[6])?;

        Ok(Self {
            timestamp: timestamp.to_string(),
            rf_power_dbm,
            lat,
            lon,
            altitude_m,
            activity,
            prev_hash,
        })
    }
}

/// Parses a numeric field that must carry exactly `decimals` decimal
/// places, so that parse-then-serialize is the identity on canonical
/// lines.
fn parse_fixed(value: &str, field: &'static str, decimals: usize) -> Result<f64, CodecError> {
    let err = || CodecError::InvalidNumber {
        field,
        value: value.to_string(),
    };

    let (_, frac) = value.split_once('.').ok_or_else(err)?;
    if frac.len() != decimals {
        return Err(err());
    }

    value.parse::<f64>().map_err(|_| err())
}
