//! # fv-types: Core types for `FieldVault`
//!
//! This crate contains shared types used across the `FieldVault` storage
//! subsystem:
//! - Addressing newtypes ([`BlockIndex`], [`RecordIndex`])
//! - Sensor-boundary types ([`Sample`], [`Activity`])
//! - Sensor unit conversions ([`rf_power_dbm`], [`classify_activity`])
//!
//! The sensor types exist only as the interface boundary between the
//! acquisition layer and the log writer. The acquisition drivers
//! themselves live outside this workspace.

use std::{
    fmt::{Debug, Display},
    ops::{Add, AddAssign},
};

use serde::{Deserialize, Serialize};

// ============================================================================
// Addressing newtypes - All Copy (cheap 8-byte values)
// ============================================================================

/// Logical index of a 512-byte block on the storage card.
///
/// Whether this is sent over the wire as-is or multiplied by the block
/// size is an addressing-mode concern owned by the card driver; callers
/// always think in block indices.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct BlockIndex(u64);

impl BlockIndex {
    pub const ZERO: BlockIndex = BlockIndex(0);

    pub fn new(index: u64) -> Self {
        Self(index)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for BlockIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for BlockIndex {
    type Output = BlockIndex;

    fn add(self, rhs: u64) -> Self::Output {
        BlockIndex(self.0 + rhs)
    }
}

impl AddAssign<u64> for BlockIndex {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl From<u64> for BlockIndex {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<BlockIndex> for u64 {
    fn from(index: BlockIndex) -> Self {
        index.0
    }
}

/// Position of a record within the log chain.
///
/// Zero-indexed and sequential: the genesis record has index 0, the
/// record chained to it has index 1, and so on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RecordIndex(u64);

impl RecordIndex {
    pub const ZERO: RecordIndex = RecordIndex(0);

    pub fn new(index: u64) -> Self {
        Self(index)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for RecordIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for RecordIndex {
    type Output = RecordIndex;

    fn add(self, rhs: u64) -> Self::Output {
        RecordIndex(self.0 + rhs)
    }
}

impl AddAssign<u64> for RecordIndex {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl From<u64> for RecordIndex {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<RecordIndex> for u64 {
    fn from(index: RecordIndex) -> Self {
        index.0
    }
}

// ============================================================================
// Sensor boundary types
// ============================================================================

/// Coarse motion state derived from accelerometer magnitude.
///
/// The display strings are part of the log line schema and must not
/// change within a log generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    Still,
    Moving,
    LowActivity,
    Unknown,
}

impl Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Activity::Still => "Still",
            Activity::Moving => "Moving",
            Activity::LowActivity => "Low Activity",
            Activity::Unknown => "Unknown",
        };
        write!(f, "{s}")
    }
}

impl Activity {
    /// Parses the schema display string back into an [`Activity`].
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Still" => Some(Activity::Still),
            "Moving" => Some(Activity::Moving),
            "Low Activity" => Some(Activity::LowActivity),
            "Unknown" => Some(Activity::Unknown),
            _ => None,
        }
    }
}

/// One sampling tick's worth of sensor readings, ready to be logged.
///
/// Produced by the acquisition layer, consumed by the log writer. The
/// numeric fields are formatted with fixed precision by the codec, so
/// the values here carry more precision than the log ever stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// ISO-8601 local timestamp with second precision,
    /// e.g. `2026-03-14T09:26:53`.
    pub timestamp: String,
    /// Received RF power in dBm (AD8318 detector).
    pub rf_power_dbm: f64,
    /// Latitude in decimal degrees; 0.0 when there is no fix.
    pub lat: f64,
    /// Longitude in decimal degrees; 0.0 when there is no fix.
    pub lon: f64,
    /// Altitude above sea level in metres.
    pub altitude_m: f64,
    /// Motion classification at the time of sampling.
    pub activity: Activity,
}

// ============================================================================
// Sensor unit conversions
// ============================================================================

/// AD8318 transfer slope in volts per dB.
const RF_SLOPE_V_PER_DB: f64 = 0.025;

/// AD8318 intercept in dBm.
const RF_INTERCEPT_DBM: f64 = -95.0;

/// ADC full-scale reading (12-bit).
const ADC_FULL_SCALE: f64 = 4095.0;

/// ADC reference voltage.
const ADC_REF_V: f64 = 3.3;

/// Converts a raw 12-bit ADC reading from the AD8318 detector into dBm.
pub fn rf_power_dbm(adc_raw: u16) -> f64 {
    let v_out = (f64::from(adc_raw) / ADC_FULL_SCALE) * ADC_REF_V;
    (v_out / RF_SLOPE_V_PER_DB) + RF_INTERCEPT_DBM
}

/// Still band: squared accelerometer magnitude close to 1 g at the
/// MPU-6050's default sensitivity.
const STILL_BAND_LOW: i64 = 15_000 * 15_000;
const STILL_BAND_HIGH: i64 = 18_000 * 18_000;

/// Above this squared magnitude the logger is considered in motion.
const MOVING_THRESHOLD: i64 = 20_000 * 20_000;

/// Classifies raw accelerometer axes into a coarse [`Activity`] state.
///
/// Thresholds are squared magnitudes, which avoids a square root on
/// every sampling tick.
pub fn classify_activity(ax: i32, ay: i32, az: i32) -> Activity {
    let mag_squared =
        i64::from(ax) * i64::from(ax) + i64::from(ay) * i64::from(ay) + i64::from(az) * i64::from(az);

    if mag_squared > MOVING_THRESHOLD {
        Activity::Moving
    } else if mag_squared > STILL_BAND_LOW && mag_squared < STILL_BAND_HIGH {
        Activity::Still
    } else {
        Activity::LowActivity
    }
}
