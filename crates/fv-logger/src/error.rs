//! Error types for the append log.

use fv_card::CardError;

/// Errors surfaced by the log stream, writer and verifier.
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    /// The underlying block device failed.
    #[error(transparent)]
    Card(#[from] CardError),

    /// The log's first line is not the expected schema header.
    ///
    /// A differing header means a different logger generation wrote
    /// this card; refusing it is a compatibility decision, not a
    /// tamper verdict.
    #[error("schema header mismatch: found {found:?}")]
    SchemaMismatch { found: String },

    /// `create` was pointed at a device that already holds content.
    #[error("device already contains {len} bytes of log content")]
    AlreadyInitialized { len: u64 },

    /// The append would run past the end of the device.
    #[error("log full: device holds {capacity_blocks} blocks")]
    CapacityExceeded { capacity_blocks: u64 },

    /// Stored log content is not valid UTF-8.
    #[error("log content is not valid UTF-8 near byte {offset}")]
    InvalidUtf8 { offset: u64 },
}
